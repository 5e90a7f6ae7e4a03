//! Relay Engine

use anyhow::Context;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::connection::ConnectionRecord;
use crate::Result;

/// Why a relay loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    ClientClosed,
    TargetClosed,
    /// The server stopped while the connection was idle or between chunks
    Shutdown,
}

/// Copies bytes between a client and its target until either side closes
#[derive(Debug, Clone)]
pub struct RelayEngine {
    buffer_size: usize,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl RelayEngine {
    pub fn new(buffer_size: usize, poll_interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            buffer_size,
            poll_interval,
            running,
        }
    }

    /// Create a relay engine from configuration
    pub fn from_config(config: &ServerConfig, running: Arc<AtomicBool>) -> Self {
        Self::new(config.buffer_size, config.poll_interval, running)
    }

    /// Relay until one side reaches EOF, an I/O error occurs, or the running
    /// flag is cleared. `pending` is written to the target first and counts
    /// as sent. Counters are updated after each successful write, so a
    /// concurrent reader never sees bytes that were not forwarded.
    pub async fn relay<C, T>(
        &self,
        client: &mut C,
        target: &mut T,
        pending: Bytes,
        record: &ConnectionRecord,
    ) -> Result<RelayOutcome>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if !pending.is_empty() {
            target.write_all(&pending).await
                .context("Failed to forward buffered request to target")?;
            record.add_sent(pending.len() as u64);
            trace!(bytes = pending.len(), "Forwarded buffered bytes");
        }

        let mut client_buf = vec![0u8; self.buffer_size];
        let mut target_buf = vec![0u8; self.buffer_size];

        loop {
            if !self.running.load(Ordering::Relaxed) {
                debug!("Relay stopping: server is shutting down");
                return Ok(RelayOutcome::Shutdown);
            }

            // Each arm runs after the other reads are dropped, so both
            // streams are free to be written inside the handlers.
            tokio::select! {
                read = client.read(&mut client_buf) => {
                    let n = read.context("Failed to read from client")?;
                    if n == 0 {
                        return Ok(RelayOutcome::ClientClosed);
                    }
                    target.write_all(&client_buf[..n]).await
                        .context("Failed to write to target")?;
                    record.add_sent(n as u64);
                }
                read = target.read(&mut target_buf) => {
                    let n = read.context("Failed to read from target")?;
                    if n == 0 {
                        return Ok(RelayOutcome::TargetClosed);
                    }
                    client.write_all(&target_buf[..n]).await
                        .context("Failed to write to client")?;
                    record.add_received(n as u64);
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}
