//! Connection Registry
//!
//! The single structure shared between connection handlers. Records are
//! inserted on accept and removed when the owning [`RegistrationGuard`] is
//! dropped, so every exit path of a handler cleans up after itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::ConnectionRecord;
use crate::stats::StatsSnapshot;

/// Live map of connection identity to traffic record
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: RwLock<HashMap<String, Arc<ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A handler that panicked while holding the lock leaves the map itself intact.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ConnectionRecord>>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ConnectionRecord>>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a zeroed record for a freshly accepted client.
    ///
    /// The identity is `ip:port`; if that key is still held by a connection
    /// that has not been cleaned up yet, a `#n` suffix keeps it unique.
    pub fn register(self: &Arc<Self>, client_addr: SocketAddr) -> RegistrationGuard {
        let base = client_addr.to_string();
        let record = {
            let mut records = self.write();
            let mut id = base.clone();
            let mut suffix = 1;
            while records.contains_key(&id) {
                suffix += 1;
                id = format!("{}#{}", base, suffix);
            }
            let record = Arc::new(ConnectionRecord::new(id.clone()));
            records.insert(id, Arc::clone(&record));
            record
        };

        debug!(connection_id = %record.id(), "Registered connection");

        RegistrationGuard {
            registry: Arc::clone(self),
            record,
        }
    }

    /// Remove a record; returns it if it was present
    pub fn remove(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            debug!(connection_id = %id, "Removed connection from registry");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Read-only view of every registered connection
    pub fn snapshot(&self) -> StatsSnapshot {
        let records = self.read();
        StatsSnapshot::from_records(records.values().map(Arc::as_ref))
    }
}

/// Owns one registry entry for the lifetime of a connection handler
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    record: Arc<ConnectionRecord>,
}

impl RegistrationGuard {
    pub fn record(&self) -> &Arc<ConnectionRecord> {
        &self.record
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.record.id());
    }
}
