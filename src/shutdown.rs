//! Graceful Shutdown Handling
//!
//! SIGTERM and SIGINT fan out to every background task through one broadcast
//! channel. The proxy listener is stopped first, then live connections get
//! up to the shutdown timeout to drain.

use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionManager;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcast shutdown to every subscriber
    pub fn trigger(&self) {
        match self.shutdown_tx.send(()) {
            Ok(n) => debug!("Shutdown signal sent to {} subscribers", n),
            Err(_) => debug!("Shutdown signal sent with no subscribers"),
        }
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Stop the proxy and wait for its connections to drain.
    /// Returns how many connections were still open at the deadline.
    pub async fn shutdown_connection_manager(&self, connection_manager: &ConnectionManager) -> usize {
        info!("Initiating graceful shutdown of connection manager");
        let start_time = Instant::now();

        connection_manager.stop();
        let remaining = connection_manager
            .wait_for_connections_to_close(self.timeout)
            .await;

        if remaining > 0 {
            warn!(
                "{} connections abandoned after {:?}",
                remaining,
                start_time.elapsed()
            );
        }

        remaining
    }
}

/// Background task that is aborted if it outlives the shutdown signal
pub struct ShutdownAwareTask {
    name: String,
    handle: tokio::task::JoinHandle<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ShutdownAwareTask {
    /// Spawn `task_fn` with its own shutdown receiver
    pub fn spawn<F, Fut>(shutdown_coordinator: &ShutdownCoordinator, task_name: &str, task_fn: F) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let task_rx = shutdown_coordinator.subscribe();
        let name = task_name.to_string();

        let task_label = name.clone();
        let handle = tokio::spawn(async move {
            debug!("Starting shutdown-aware task: {}", task_label);
            task_fn(task_rx).await;
            debug!("Shutdown-aware task completed: {}", task_label);
        });

        Self {
            name,
            handle,
            shutdown_rx: shutdown_coordinator.subscribe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the task to finish on its own. Once shutdown is signalled it
    /// gets `grace` to wind down before it is aborted.
    pub async fn join(mut self, grace: Duration) -> Result<()> {
        let result = tokio::select! {
            result = &mut self.handle => result,
            _ = self.shutdown_rx.recv() => {
                match tokio::time::timeout(grace, &mut self.handle).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Task {} did not stop within {:?}, aborting", self.name, grace);
                        self.handle.abort();
                        return Ok(());
                    }
                }
            }
        };

        match result {
            Ok(()) => {
                debug!("Task {} completed", self.name);
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                debug!("Task {} was cancelled", self.name);
                Ok(())
            }
            Err(e) => {
                error!("Task {} failed: {}", self.name, e);
                Err(anyhow::anyhow!("Task {} failed: {}", self.name, e))
            }
        }
    }
}
