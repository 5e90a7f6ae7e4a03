//! Management API Module
//!
//! Read-only REST API and event stream over the proxy's live state.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ManagementApi;
pub use handlers::AppState;
pub use server::ManagementServer;
pub use types::*;
