//! Management API Types

use serde::Serialize;
use std::time::SystemTime;

use crate::stats::ConnectionSummary;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

/// Liveness information
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub running: bool,
}

/// Server status information
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub proxy_type: String,
    pub listen_addr: Option<String>,
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub total_bytes: u64,
    pub version: String,
}

/// Live connection listing
#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub total: usize,
    pub connections: Vec<ConnectionSummary>,
}
