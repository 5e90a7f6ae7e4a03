//! Point-in-time statistics views

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionRecord;

/// Per-connection line of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub target: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// RFC 3339 / ISO-8601, UTC
    pub start_time: String,
}

impl ConnectionSummary {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }
}

/// Aggregate view of the registry handed to external reporters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_connections: usize,
    pub total_bytes: u64,
    pub active_connections: Vec<ConnectionSummary>,
}

impl StatsSnapshot {
    /// Build a snapshot from live records.
    ///
    /// `total_bytes` is summed from the same summaries that are listed, so the
    /// two always agree even if relays advance the counters mid-collection.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ConnectionRecord>,
    {
        let mut active_connections: Vec<ConnectionSummary> =
            records.into_iter().map(ConnectionRecord::summary).collect();
        active_connections.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let total_bytes = active_connections.iter().map(ConnectionSummary::total_bytes).sum();

        Self {
            total_connections: active_connections.len(),
            total_bytes,
            active_connections,
        }
    }
}
