//! Management API Server

use super::{api::ManagementApi, handlers::AppState};
use crate::{connection::ConnectionManager, stats::StatsSnapshot, Result};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::{
    net::TcpListener,
    sync::{broadcast, watch},
};
use tracing::{error, info};

/// Management API server
pub struct ManagementServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl ManagementServer {
    /// Create a new management server
    pub fn new(
        bind_addr: SocketAddr,
        manager: Arc<ConnectionManager>,
        stats: watch::Receiver<StatsSnapshot>,
    ) -> Self {
        let app_state = AppState {
            manager,
            stats,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
        }
    }

    /// Serve until a shutdown signal arrives
    pub async fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting management API server on {}", self.bind_addr);

        let app = ManagementApi::create_router(self.app_state);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind management API server to {}", self.bind_addr))?;

        info!("Management API server listening on {}", self.bind_addr);

        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
            info!("Management API server shutting down");
        };

        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("Management API server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }
}
