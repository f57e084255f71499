//! Station Registry (spec.md §4.5; SPEC_FULL.md §3.4) — tracks which local
//! actor owns which station id, mirrored in the Cache/Bus so other
//! processes (and the Lifecycle Engine's precondition checks) can tell
//! whether a station is reachable. Generalized from the teacher's
//! `SessionRegistry` (`DashMap<station_id, Connection>`), with an explicit
//! `connection_epoch` so a reconnect race can't let a stale handle win.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use crate::infrastructure::bus::SharedBus;

/// A request to close a locally-owned station connection (administrative
/// disconnect, e.g. triggered by a Reset command or shutdown).
#[derive(Debug, Clone, Copy)]
pub struct CloseRequest;

struct LocalEntry {
    connection_epoch: u64,
    close_tx: mpsc::Sender<CloseRequest>,
}

pub enum RegisterOutcome {
    Registered,
    /// A previous local connection for this station was replaced; its epoch
    /// is returned so the old actor can recognize it has been superseded.
    Replaced { previous_epoch: u64 },
}

pub struct StationRegistry {
    local: DashMap<String, LocalEntry>,
    epoch_counter: AtomicU64,
    bus: SharedBus,
}

impl StationRegistry {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            local: DashMap::new(),
            epoch_counter: AtomicU64::new(1),
            bus,
        }
    }

    /// Registers `station_id` as locally connected, returning its fresh
    /// epoch and whether a prior connection was displaced.
    pub fn register(
        &self,
        station_id: &str,
        close_tx: mpsc::Sender<CloseRequest>,
        heartbeat_interval: Duration,
    ) -> (u64, RegisterOutcome) {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let previous = self.local.insert(
            station_id.to_owned(),
            LocalEntry { connection_epoch: epoch, close_tx },
        );
        self.bus.mark_connected(station_id, heartbeat_interval * 2);
        metrics::gauge!("ocpp_connected_stations").set(self.local.len() as f64);
        info!(station_id, epoch, "station registered");

        match previous {
            Some(prev) => (epoch, RegisterOutcome::Replaced { previous_epoch: prev.connection_epoch }),
            None => (epoch, RegisterOutcome::Registered),
        }
    }

    /// Unregisters `station_id`, but only if `epoch` still matches the
    /// currently-registered connection (a stale actor unregistering after
    /// having been replaced must not evict the new one).
    pub fn unregister(&self, station_id: &str, epoch: u64) {
        let removed = self
            .local
            .remove_if(station_id, |_, entry| entry.connection_epoch == epoch)
            .is_some();
        if removed {
            self.bus.remove_connected(station_id);
            metrics::gauge!("ocpp_connected_stations").set(self.local.len() as f64);
            info!(station_id, epoch, "station unregistered");
        }
    }

    /// Refreshes the Bus TTL on heartbeat (spec.md §4.5).
    pub fn touch(&self, station_id: &str, heartbeat_interval: Duration) {
        if self.local.contains_key(station_id) {
            self.bus.mark_connected(station_id, heartbeat_interval * 2);
        }
    }

    /// True only if this process owns the live socket — a missing local
    /// entry means this process does not own it, even if the Bus mirror
    /// hasn't expired yet (spec.md §4.5).
    pub fn is_locally_connected(&self, station_id: &str) -> bool {
        self.local.contains_key(station_id)
    }

    pub fn is_connected_anywhere(&self, station_id: &str) -> bool {
        self.is_locally_connected(station_id) || self.bus.is_connected(station_id)
    }

    pub fn connected_count(&self) -> usize {
        self.local.len()
    }

    pub async fn request_close(&self, station_id: &str) {
        if let Some(entry) = self.local.get(station_id) {
            let _ = entry.close_tx.send(CloseRequest).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bus::InProcessBus;

    fn close_tx() -> mpsc::Sender<CloseRequest> {
        mpsc::channel(1).0
    }

    #[test]
    fn a_stale_unregister_does_not_evict_the_replacing_connection() {
        let registry = StationRegistry::new(InProcessBus::shared());

        let (first_epoch, outcome) = registry.register("CP1", close_tx(), Duration::from_secs(300));
        assert!(matches!(outcome, RegisterOutcome::Registered));

        let (second_epoch, outcome) = registry.register("CP1", close_tx(), Duration::from_secs(300));
        assert!(matches!(outcome, RegisterOutcome::Replaced { previous_epoch } if previous_epoch == first_epoch));
        assert_ne!(first_epoch, second_epoch);

        registry.unregister("CP1", first_epoch);
        assert!(registry.is_locally_connected("CP1"), "unregistering a superseded epoch must not evict the new connection");

        registry.unregister("CP1", second_epoch);
        assert!(!registry.is_locally_connected("CP1"));
    }

    #[test]
    fn connected_anywhere_reflects_the_bus_mirror_even_without_a_local_entry() {
        let bus = InProcessBus::shared();
        let registry = StationRegistry::new(bus.clone());
        assert!(!registry.is_connected_anywhere("CP2"));

        bus.mark_connected("CP2", Duration::from_secs(60));
        assert!(registry.is_connected_anywhere("CP2"));
        assert!(!registry.is_locally_connected("CP2"), "the bus mirror alone doesn't imply local ownership");
    }
}
