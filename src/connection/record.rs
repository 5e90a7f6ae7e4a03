//! Per-connection traffic record

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

use crate::stats::ConnectionSummary;

/// Target label reported for connections that have not finished negotiating
pub const UNRESOLVED_TARGET: &str = "unresolved";

/// Live state of one accepted connection.
///
/// Only the handler that owns the connection mutates it; the stats exporter
/// reads it concurrently, which is why the counters are atomics and the target
/// is a set-once cell.
#[derive(Debug)]
pub struct ConnectionRecord {
    id: String,
    target: OnceLock<String>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    start_time: SystemTime,
    started: Instant,
}

impl ConnectionRecord {
    pub fn new(id: String) -> Self {
        Self {
            id,
            target: OnceLock::new(),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: SystemTime::now(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `host:port` the connection was negotiated to, if any
    pub fn target(&self) -> Option<&str> {
        self.target.get().map(String::as_str)
    }

    /// Record the negotiated target. The first value wins.
    pub fn set_target(&self, target: String) -> bool {
        match self.target.set(target) {
            Ok(()) => true,
            Err(rejected) => {
                warn!(connection_id = %self.id, rejected = %rejected, "Target already set for connection");
                false
            }
        }
    }

    /// Add bytes written to the target (client -> target)
    pub fn add_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes written to the client (target -> client)
    pub fn add_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.started.elapsed()
    }

    /// Point-in-time view. Each counter is loaded exactly once so the summary
    /// is self-consistent even while a relay keeps adding to it.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            target: self.target().unwrap_or(UNRESOLVED_TARGET).to_string(),
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
            start_time: humantime::format_rfc3339_millis(self.start_time).to_string(),
        }
    }
}
