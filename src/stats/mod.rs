//! Stats Module
//!
//! Read-only snapshots of the connection registry and their periodic publication.

pub mod broadcaster;
pub mod snapshot;

pub use broadcaster::StatsBroadcaster;
pub use snapshot::{ConnectionSummary, StatsSnapshot};
