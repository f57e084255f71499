//! Command Router (spec.md §4.4; SPEC_FULL.md §3.8) — REST/engine-initiated
//! commands delivered to the station-owning actor over the Cache/Bus topic
//! `commands:{station_id}`.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use crate::charging::commands::{OutboundAction, RoutedCommand};
use crate::infrastructure::bus::SharedBus;
use crate::shared::errors::{DomainError, DomainResult};

pub enum DeliveryOutcome {
    Delivered,
    /// No subscriber was listening on this station's topic (disconnected).
    /// The caller is responsible for compensation (spec.md §4.4).
    Undelivered,
}

pub struct CommandRouter {
    bus: SharedBus,
    nonce_counter: AtomicU64,
}

impl CommandRouter {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            nonce_counter: AtomicU64::new(1),
        }
    }

    fn topic(station_id: &str) -> String {
        format!("commands:{station_id}")
    }

    pub fn publish(&self, station_id: &str, action: OutboundAction) -> DomainResult<DeliveryOutcome> {
        let nonce = self.nonce_counter.fetch_add(1, Ordering::SeqCst);
        let command = RoutedCommand {
            nonce,
            station_id: station_id.to_owned(),
            action,
        };
        let bytes = serde_json::to_vec(&command)
            .map_err(|e| DomainError::Internal(format!("command encode: {e}")))?;

        let delivered = self.bus.publish(&Self::topic(station_id), bytes);
        if delivered == 0 {
            warn!(station_id, action = command.action.action_name(), "command undelivered, no subscriber");
            Ok(DeliveryOutcome::Undelivered)
        } else {
            Ok(DeliveryOutcome::Delivered)
        }
    }

    pub fn subscribe(&self, station_id: &str) -> broadcast::Receiver<Vec<u8>> {
        self.bus.subscribe(&Self::topic(station_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bus::InProcessBus;

    #[test]
    fn publish_without_a_subscriber_is_undelivered() {
        let router = CommandRouter::new(InProcessBus::shared());
        let outcome = router
            .publish("CP1", OutboundAction::Reset { reset_type: "Soft".to_owned() })
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Undelivered));
    }

    #[test]
    fn publish_with_a_live_subscriber_is_delivered_with_increasing_nonces() {
        let router = CommandRouter::new(InProcessBus::shared());
        let mut rx = router.subscribe("CP1");

        let outcome = router
            .publish("CP1", OutboundAction::RemoteStopTransaction { transaction_id: 1 })
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Delivered));
        router
            .publish("CP1", OutboundAction::RemoteStopTransaction { transaction_id: 2 })
            .unwrap();

        let first: RoutedCommand = serde_json::from_slice(&rx.try_recv().unwrap()).unwrap();
        let second: RoutedCommand = serde_json::from_slice(&rx.try_recv().unwrap()).unwrap();
        assert!(second.nonce > first.nonce, "nonces strictly increase across publishes");
    }
}
