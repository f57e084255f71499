//! Cache/Bus — key-value cache, pub/sub channels, and distributed locks
//! (spec.md §2, §4.4, §4.6). One in-process implementation backed by
//! `dashmap` + `tokio::sync::broadcast`, generalized from the teacher's
//! `EventBus` (notifications/event_bus.rs) and `SessionRegistry`
//! (application/charging/session/registry.rs) idioms — single process now,
//! swappable later (SPEC_FULL.md §3.2).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// A held lock; dropping it (or letting its TTL lapse) releases leadership.
pub struct LockGuard {
    key: String,
    locks: Arc<DashMap<String, (String, Instant)>>,
    holder: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove the entry if we still hold it — a renewal by a later
        // holder (after our TTL lapsed) must not be clobbered.
        if let Some(entry) = self.locks.get(&self.key) {
            if entry.0 == self.holder {
                drop(entry);
                self.locks.remove(&self.key);
            }
        }
    }
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish raw bytes to `topic`. Returns the number of live subscribers
    /// that received it (0 means "undelivered" per spec.md §4.4).
    fn publish(&self, topic: &str, payload: Vec<u8>) -> usize;

    /// Subscribe to `topic`; each call gets its own receiver.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>>;

    /// Attempt to acquire `key` for `ttl`. Returns `None` if another holder
    /// currently owns it and its TTL hasn't lapsed.
    fn lock(&self, key: &str, holder: &str, ttl: Duration) -> Option<LockGuard>;

    /// Record connectivity for `station_id` with the given TTL (Station
    /// Registry mirror, spec.md §4.5).
    fn mark_connected(&self, station_id: &str, ttl: Duration);

    fn is_connected(&self, station_id: &str) -> bool;

    fn remove_connected(&self, station_id: &str);
}

pub type SharedBus = Arc<dyn Bus>;

/// In-process Cache/Bus. Topics are created lazily on first publish or
/// subscribe; TTL bookkeeping for locks and the `connected_stations` set is
/// explicit, matching spec.md §4.5/§4.6 rather than relying on an external
/// store's native expiry (the teacher never reaches for redis either).
pub struct InProcessBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    locks: Arc<DashMap<String, (String, Instant)>>,
    connected_stations: DashMap<String, Instant>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            locks: Arc::new(DashMap::new()),
            connected_stations: DashMap::new(),
        }
    }

    pub fn shared() -> SharedBus {
        Arc::new(Self::new())
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(DEFAULT_TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InProcessBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        let sender = self.sender_for(topic);
        match sender.send(payload) {
            Ok(n) => n,
            Err(_) => {
                debug!(topic, "publish with no subscribers");
                0
            }
        }
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender_for(topic).subscribe()
    }

    fn lock(&self, key: &str, holder: &str, ttl: Duration) -> Option<LockGuard> {
        let now = Instant::now();
        let mut acquired = false;
        self.locks
            .entry(key.to_owned())
            .and_modify(|(current_holder, expires_at)| {
                if *expires_at <= now || current_holder == holder {
                    *current_holder = holder.to_owned();
                    *expires_at = now + ttl;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                (holder.to_owned(), now + ttl)
            });

        if acquired {
            Some(LockGuard {
                key: key.to_owned(),
                locks: self.locks.clone(),
                holder: holder.to_owned(),
            })
        } else {
            None
        }
    }

    fn mark_connected(&self, station_id: &str, ttl: Duration) {
        self.connected_stations
            .insert(station_id.to_owned(), Instant::now() + ttl);
    }

    fn is_connected(&self, station_id: &str) -> bool {
        match self.connected_stations.get(station_id) {
            Some(expires_at) => *expires_at > Instant::now(),
            None => false,
        }
    }

    fn remove_connected(&self, station_id: &str) {
        self.connected_stations.remove(station_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = InProcessBus::new();
        let mut rx = bus.subscribe("commands:CP1");
        let delivered = bus.publish("commands:CP1", b"hello".to_vec());
        assert_eq!(delivered, 1);
        let payload = rx.recv().await.unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn publish_with_no_subscriber_is_undelivered() {
        let bus = InProcessBus::new();
        assert_eq!(bus.publish("commands:CP2", b"x".to_vec()), 0);
    }

    #[test]
    fn lock_mutual_exclusion() {
        let bus = InProcessBus::new();
        let guard_a = bus.lock("reconciler-leader", "node-a", Duration::from_secs(60));
        assert!(guard_a.is_some());
        assert!(bus.lock("reconciler-leader", "node-b", Duration::from_secs(60)).is_none());
        drop(guard_a);
        assert!(bus.lock("reconciler-leader", "node-b", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn connected_stations_respect_ttl() {
        let bus = InProcessBus::new();
        bus.mark_connected("CP1", Duration::from_secs(0));
        assert!(!bus.is_connected("CP1"));
    }
}
