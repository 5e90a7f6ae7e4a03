//! Periodic stats publisher
//!
//! Polls the registry on a fixed interval and republishes the snapshot on a
//! `watch` channel. Observers (the management API's event stream, logging)
//! subscribe to the channel instead of touching the registry themselves.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::StatsSnapshot;
use crate::connection::ConnectionRegistry;

pub struct StatsBroadcaster {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    tx: watch::Sender<StatsSnapshot>,
}

impl StatsBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(StatsSnapshot::default());
        Self { registry, interval, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.tx.subscribe()
    }

    /// Take a snapshot and publish it immediately
    pub fn publish_now(&self) -> StatsSnapshot {
        let snapshot = self.registry.snapshot();
        self.tx.send_replace(snapshot.clone());
        snapshot
    }

    /// Publish every `interval` until a shutdown signal arrives
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Stats broadcaster started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.publish_now();
                    debug!(
                        total_connections = snapshot.total_connections,
                        total_bytes = snapshot.total_bytes,
                        subscribers = self.tx.receiver_count(),
                        "Published stats snapshot"
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("Stats broadcaster stopping");
                    break;
                }
            }
        }
    }
}
