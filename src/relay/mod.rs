//! Data Relay Module
//!
//! Dials targets and moves bytes between client and target.

pub mod connector;
pub mod engine;

pub use connector::TargetConnector;
pub use engine::{RelayEngine, RelayOutcome};
