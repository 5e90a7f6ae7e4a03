//! Management API Routes

use super::handlers::*;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Management API router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the management API router
    pub fn create_router(state: AppState) -> Router {
        let routes = Router::new()
            .route("/health", get(health_check))
            .route("/status", get(get_server_status))
            .route("/connections", get(get_connections))
            .route("/stats", get(get_stats))
            .route("/stats/stream", get(stats_stream))
            .with_state(state);

        Router::new()
            .nest("/api/v1", routes)
            .fallback(not_found)
            .layer(CorsLayer::permissive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::ConnectionManager;
    use crate::stats::StatsSnapshot;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::SystemTime;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let manager = Arc::new(ConnectionManager::new(Arc::new(Config::default())));
        let (_tx, stats) = watch::channel(StatsSnapshot::default());
        AppState {
            manager,
            stats,
            start_time: SystemTime::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = ManagementApi::create_router(create_test_state());
        let (status, body) = get_json(app, "/api/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["running"], false);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = ManagementApi::create_router(create_test_state());
        let (status, body) = get_json(app, "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["proxy_type"], "http");
        assert_eq!(body["data"]["active_connections"], 0);
        assert!(body["data"]["listen_addr"].is_null());
    }

    #[tokio::test]
    async fn test_connections_endpoint_lists_registered_clients() {
        let state = create_test_state();
        let guard = state.manager.registry().register("10.0.0.9:4242".parse().unwrap());
        guard.record().add_sent(12);
        let app = ManagementApi::create_router(state);

        let (status, body) = get_json(app, "/api/v1/connections").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["connections"][0]["id"], "10.0.0.9:4242");
        assert_eq!(body["data"]["connections"][0]["target"], "unresolved");
        assert_eq!(body["data"]["connections"][0]["bytes_sent"], 12);
    }

    #[tokio::test]
    async fn test_stats_endpoint_shape() {
        let app = ManagementApi::create_router(create_test_state());
        let (status, body) = get_json(app, "/api/v1/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_connections"], 0);
        assert_eq!(body["data"]["total_bytes"], 0);
        assert!(body["data"]["active_connections"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = ManagementApi::create_router(create_test_state());
        let (status, body) = get_json(app, "/api/v1/users").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert_eq!(body["error"], "No route for /api/v1/users");
    }
}
