//! dualproxy library
//!
//! A forward proxy that speaks either HTTP (CONNECT tunnels and plain
//! request forwarding) or SOCKS5 on one listener, and keeps a live registry
//! of per-connection traffic that can be read as a [`StatsSnapshot`].

pub mod config;
pub mod connection;
pub mod management;
pub mod protocol;
pub mod relay;
pub mod shutdown;
pub mod stats;

pub use config::{Config, ProxyKind};
pub use connection::ConnectionManager;
pub use shutdown::ShutdownCoordinator;
pub use stats::StatsSnapshot;

/// Common error type for the proxy server
pub type Result<T> = anyhow::Result<T>;
