//! Connection Manager Implementation

use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use super::{ConnectionRegistry, RegistrationGuard};
use crate::config::Config;
use crate::protocol::{Negotiation, Negotiator};
use crate::relay::{RelayEngine, RelayOutcome, TargetConnector};
use crate::stats::StatsSnapshot;
use crate::Result;

/// Owns the listener, the registry and the lifecycle of every connection
pub struct ConnectionManager {
    config: Arc<Config>,
    registry: Arc<ConnectionRegistry>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    local_addr: OnceLock<SocketAddr>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: Arc<Config>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            local_addr: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bind and accept until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the listening socket with address reuse and the configured backlog
    pub async fn bind(&self) -> Result<TcpListener> {
        let bind_target = self.config.server.bind_target();

        info!("Binding TCP listener to {}", bind_target);
        let bind_addr = lookup_host(&bind_target)
            .await
            .with_context(|| format!("Failed to resolve bind address {}", bind_target))?
            .next()
            .ok_or_else(|| anyhow!("Bind address {} resolved to nothing", bind_target))?;

        let socket = if bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(bind_addr)
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        let listener = socket
            .listen(self.config.server.backlog)
            .with_context(|| format!("Failed to listen on {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        self.running.store(true, Ordering::SeqCst);

        info!(
            proxy_type = %self.config.server.proxy_type,
            "Proxy server listening on {}", local_addr
        );
        Ok(listener)
    }

    /// Main connection acceptance loop
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let server = &self.config.server;
        let local_port = listener.local_addr()?.port();

        let negotiator = Arc::new(Negotiator::new(
            server.proxy_type,
            TargetConnector::new(server.connect_timeout),
            server.max_header_size,
            local_port,
        ));
        let relay = Arc::new(RelayEngine::from_config(server, Arc::clone(&self.running)));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("Starting connection acceptance loop");

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            // Registered before the handler starts, so a stats
                            // read right after accept already sees the client.
                            let guard = self.registry.register(addr);
                            debug!(connection_id = %guard.id(), "Accepted connection from {}", addr);

                            let negotiator = Arc::clone(&negotiator);
                            let relay = Arc::clone(&relay);
                            tokio::spawn(async move {
                                Self::handle_connection(stream, addr, guard, negotiator, relay).await;
                            });
                        }
                        Err(e) => {
                            if self.running.load(Ordering::SeqCst) {
                                error!("Error accepting connection: {}", e);
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        drop(listener);
        info!("Connection acceptance loop stopped");
        Ok(())
    }

    /// Negotiate, relay, then tear both sides down. The registry entry is
    /// released on every path when `guard` drops.
    #[instrument(
        name = "connection",
        skip(stream, guard, negotiator, relay),
        fields(connection_id = %guard.id(), client_addr = %addr)
    )]
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        guard: RegistrationGuard,
        negotiator: Arc<Negotiator>,
        relay: Arc<RelayEngine>,
    ) {
        let record = Arc::clone(guard.record());

        let negotiated = match negotiator.negotiate(stream, &record).await {
            Ok(Negotiation::Established(negotiated)) => negotiated,
            Ok(Negotiation::Closed) => {
                debug!("Connection closed during negotiation");
                return;
            }
            Err(e) => {
                warn!(phase = "negotiation", "Connection failed: {:#}", e);
                return;
            }
        };

        let mut client = negotiated.client;
        let mut target = negotiated.target_stream;

        match relay
            .relay(&mut client, &mut target, negotiated.pending, &record)
            .await
        {
            Ok(RelayOutcome::ClientClosed) => debug!("Client closed the connection"),
            Ok(RelayOutcome::TargetClosed) => debug!("Target closed the connection"),
            Ok(RelayOutcome::Shutdown) => debug!("Relay interrupted by shutdown"),
            Err(e) => warn!(phase = "relay", "Connection failed: {:#}", e),
        }

        let _ = client.shutdown().await;
        let _ = target.shutdown().await;
        drop(guard);

        info!(
            target_addr = %negotiated.target,
            bytes_sent = record.bytes_sent(),
            bytes_received = record.bytes_received(),
            duration = ?record.duration(),
            "Connection closed"
        );
    }

    /// Stop accepting. Live relays notice within one poll interval.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Stop requested but the server is not running");
        }
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No acceptance loop to notify: {}", e);
        }
        info!("Proxy server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener actually bound, once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// Current view of every live connection
    pub fn snapshot(&self) -> StatsSnapshot {
        self.registry.snapshot()
    }

    /// Wait for all connections to close, up to `timeout`.
    /// Returns the number still open when the wait ended.
    pub async fn wait_for_connections_to_close(&self, timeout: Duration) -> usize {
        let start_time = Instant::now();

        info!(
            "Waiting for {} active connections to close (timeout: {:?})",
            self.active_connections(),
            timeout
        );

        while self.active_connections() > 0 && start_time.elapsed() < timeout {
            debug!("Waiting for {} active connections to close", self.active_connections());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.active_connections();
        if remaining == 0 {
            info!("All connections closed gracefully in {:?}", start_time.elapsed());
        } else {
            warn!(
                "Shutdown timeout reached after {:?} with {} connections still active",
                start_time.elapsed(),
                remaining
            );
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyKind;

    fn test_config(kind: ProxyKind) -> Arc<Config> {
        let mut config = Config::default();
        config.server.bind_host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.proxy_type = kind;
        config.server.poll_interval = Duration::from_millis(50);
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let manager = ConnectionManager::new(test_config(ProxyKind::Http));
        assert!(!manager.is_running());
        assert_eq!(manager.local_addr(), None);

        let listener = manager.bind().await.unwrap();
        let addr = manager.local_addr().unwrap();
        assert_eq!(addr, listener.local_addr().unwrap());
        assert_ne!(addr.port(), 0);
        assert!(manager.is_running());
    }

    #[tokio::test]
    async fn test_stop_ends_serve_loop() {
        let manager = Arc::new(ConnectionManager::new(test_config(ProxyKind::Socks5)));
        let listener = manager.bind().await.unwrap();

        let serving = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.serve(listener).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), serving).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert!(!manager.is_running());
        assert!(manager.snapshot().active_connections.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_connections_with_none_open() {
        let manager = ConnectionManager::new(test_config(ProxyKind::Http));
        assert_eq!(manager.wait_for_connections_to_close(Duration::from_millis(10)).await, 0);
    }
}
