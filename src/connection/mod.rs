//! Connection Management Module
//!
//! Handles TCP connection acceptance, per-connection records and the registry
//! that stats are read from.

pub mod manager;
pub mod record;
pub mod registry;

pub use manager::ConnectionManager;
pub use record::{ConnectionRecord, UNRESOLVED_TARGET};
pub use registry::{ConnectionRegistry, RegistrationGuard};
