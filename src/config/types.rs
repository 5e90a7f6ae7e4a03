//! Configuration Types

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
}

/// Which handshake the listener speaks. Fixed for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyKind::Http),
            "socks5" | "socks" => Ok(ProxyKind::Socks5),
            other => Err(anyhow!("unknown proxy type '{}', expected 'http' or 'socks5'", other)),
        }
    }
}

/// Proxy listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    pub proxy_type: ProxyKind,
    /// Upper bound on dialing a target
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// How often an idle relay wakes up to check whether the server is still running
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub buffer_size: usize,
    pub backlog: u32,
    /// Largest HTTP request head accepted before the terminating blank line
    pub max_header_size: usize,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` string handed to the resolver when binding
    pub fn bind_target(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]:{}", self.bind_host, self.port)
        } else {
            format!("{}:{}", self.bind_host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8888,
            proxy_type: ProxyKind::Http,
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            buffer_size: 4096,
            backlog: 128,
            max_header_size: 64 * 1024,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Period of the stats broadcaster
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
    pub management_api: ManagementApiConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval: Duration::from_secs(2),
            management_api: ManagementApiConfig::default(),
        }
    }
}

/// Management API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementApiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
        }
    }
}
