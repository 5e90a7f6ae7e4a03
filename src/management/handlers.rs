//! Management API Handlers

use super::types::*;
use crate::connection::ConnectionManager;
use crate::stats::StatsSnapshot;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tracing::{debug, warn};

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub stats: watch::Receiver<StatsSnapshot>,
    pub start_time: SystemTime,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let running = state.manager.is_running();
    let health = HealthStatus {
        status: if running { "healthy" } else { "stopped" }.to_string(),
        running,
    };
    Json(ApiResponse::success(health))
}

/// Get server status
pub async fn get_server_status(State(state): State<AppState>) -> Json<ApiResponse<ServerStatus>> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let snapshot = state.manager.snapshot();
    let status = ServerStatus {
        running: state.manager.is_running(),
        proxy_type: state.manager.config().server.proxy_type.to_string(),
        listen_addr: state.manager.local_addr().map(|a| a.to_string()),
        uptime_seconds: uptime,
        active_connections: snapshot.total_connections,
        total_bytes: snapshot.total_bytes,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(status))
}

/// Get the live connection table
pub async fn get_connections(State(state): State<AppState>) -> Json<ApiResponse<ConnectionList>> {
    let snapshot = state.manager.snapshot();
    Json(ApiResponse::success(ConnectionList {
        total: snapshot.total_connections,
        connections: snapshot.active_connections,
    }))
}

/// Get a fresh stats snapshot
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsSnapshot>> {
    Json(ApiResponse::success(state.manager.snapshot()))
}

/// Server-sent events carrying each published snapshot
pub async fn stats_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Stats stream subscriber connected");

    let stream = WatchStream::new(state.stats.clone()).filter_map(|snapshot| {
        match Event::default().event("stats").json_data(&snapshot) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!("Failed to encode stats snapshot: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// JSON 404 for anything outside the known routes
pub async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<()>>) {
    debug!("Unknown management route: {}", uri);
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("No route for {}", uri.path()))),
    )
}
