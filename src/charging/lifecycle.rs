//! Charging Lifecycle Engine (spec.md §4.3; SPEC_FULL.md §3.7) — the sole
//! writer of `ChargingSession`. New business logic: the teacher's
//! `BillingService` only ever computes cost after the fact for invoicing;
//! this engine reserves, starts, meters, stops, and refunds a prepaid
//! wallet, built in the idiom of `application/charging/services/billing.rs`
//! (service struct over `Arc<dyn RepositoryProvider>`, `DomainResult<T>`
//! everywhere, `tracing::info!` logging the monetary fields it computes).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::charging::command_router::{CommandRouter, DeliveryOutcome};
use crate::charging::commands::OutboundAction;
use crate::charging::registry::StationRegistry;
use crate::domain::repositories::{
    ChargingSessionRepository, ClientRepository, ConnectorRepository, StopOutcome, TariffRepository,
};
use crate::domain::{ChargingSession, ConnectorStatus, LimitKind, RepositoryProvider, SessionStatus};
use crate::infrastructure::bus::SharedBus;
use crate::shared::errors::{DomainError, DomainResult};

fn decimal_to_i64_ceil(d: Decimal) -> DomainResult<i64> {
    d.ceil()
        .to_string()
        .parse::<i64>()
        .map_err(|e| DomainError::Internal(format!("amount overflow: {e}")))
}

fn decimal_to_i64_round(d: Decimal) -> DomainResult<i64> {
    d.round()
        .to_string()
        .parse::<i64>()
        .map_err(|e| DomainError::Internal(format!("amount overflow: {e}")))
}

pub struct ChargingLifecycleEngine {
    repos: Arc<dyn RepositoryProvider>,
    registry: Arc<StationRegistry>,
    command_router: Arc<CommandRouter>,
    bus: SharedBus,
    default_tariff_price: Decimal,
}

impl ChargingLifecycleEngine {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        registry: Arc<StationRegistry>,
        command_router: Arc<CommandRouter>,
        bus: SharedBus,
        default_tariff_price: Decimal,
    ) -> Self {
        Self {
            repos,
            registry,
            command_router,
            bus,
            default_tariff_price,
        }
    }

    /// `StartCharge` (spec.md §4.3). Concurrent calls for the same client
    /// are serialized through a short-lived Bus lock keyed on `client_id` —
    /// the second of two simultaneous callers observes the lock held and
    /// returns `ClientBusy` immediately, which is what guarantees "at most
    /// one active charge per client" holds even under a race between the
    /// precondition check and the reservation (spec.md §8 scenario 6).
    pub async fn start_charge(
        &self,
        client_id: &str,
        station_id: &str,
        connector_id: i32,
        limit_kind: LimitKind,
        limit_value: Decimal,
    ) -> DomainResult<String> {
        let lock_holder = Uuid::new_v4().to_string();
        let Some(_guard) = self.bus.lock(
            &format!("start-charge:{client_id}"),
            &lock_holder,
            std::time::Duration::from_secs(30),
        ) else {
            return Err(DomainError::ClientBusy);
        };
        // A second lock scoped to the connector, not the client, closes the
        // race two *different* clients racing `has_live_for_connector` on
        // the same `(station_id, connector_id)` would otherwise hit —
        // `ClientBusy` above only serializes starts from the same client
        // (spec.md §8 "at most one active charge per connector").
        let Some(_connector_guard) = self.bus.lock(
            &format!("start-charge-conn:{station_id}:{connector_id}"),
            &lock_holder,
            std::time::Duration::from_secs(30),
        ) else {
            return Err(DomainError::ConnectorBusy);
        };

        if self.repos.charging_sessions().has_live_for_client(client_id).await? {
            return Err(DomainError::ClientBusy);
        }
        if self
            .repos
            .charging_sessions()
            .has_live_for_connector(station_id, connector_id)
            .await?
            || !self.repos.connectors().is_available(station_id, connector_id).await?
        {
            return Err(DomainError::ConnectorBusy);
        }
        if !self.registry.is_connected_anywhere(station_id) {
            return Err(DomainError::StationUnavailable(station_id.to_owned()));
        }

        let now = Utc::now();
        let price = self
            .repos
            .tariffs()
            .effective_price(station_id, now, self.default_tariff_price)
            .await?;

        let reserved_amount = match limit_kind {
            LimitKind::Amount => decimal_to_i64_round(limit_value)?,
            LimitKind::Energy => decimal_to_i64_ceil(limit_value * price)?,
        };
        if reserved_amount <= 0 {
            return Err(DomainError::InvalidArgument("limit_value must be positive".into()));
        }

        let Some(_post_debit_balance) = self.repos.clients().debit(client_id, reserved_amount).await?
        else {
            return Err(DomainError::InsufficientFunds);
        };

        let session_id = Uuid::new_v4().to_string();
        let id_tag = format!("sess-{session_id}");
        let session = ChargingSession {
            id: session_id.clone(),
            client_id: client_id.to_owned(),
            station_id: station_id.to_owned(),
            connector_id,
            limit_kind,
            limit_value,
            reserved_amount,
            id_tag: id_tag.clone(),
            ocpp_tx_id: None,
            meter_start: None,
            meter_stop: None,
            energy_delivered_wh: None,
            amount_charged: None,
            refund_amount: None,
            status: SessionStatus::Pending,
            created_at: now,
            started_at: None,
            stopped_at: None,
        };

        if let Err(e) = self.repos.charging_sessions().insert_pending(session).await {
            self.repos.clients().credit(client_id, reserved_amount).await?;
            return Err(e);
        }

        let delivery = self
            .command_router
            .publish(station_id, OutboundAction::RemoteStartTransaction { connector_id, id_tag })
            .unwrap_or(DeliveryOutcome::Undelivered);

        match delivery {
            DeliveryOutcome::Delivered => {
                self.repos.charging_sessions().mark_starting(&session_id).await?;
                info!(session_id, client_id, station_id, reserved_amount, "charge reserved and RemoteStartTransaction dispatched");
                Ok(session_id)
            }
            DeliveryOutcome::Undelivered => {
                warn!(session_id, station_id, "RemoteStartTransaction undelivered, compensating");
                self.repos.clients().credit(client_id, reserved_amount).await?;
                self.repos
                    .charging_sessions()
                    .mark_failed(&session_id, Some(reserved_amount))
                    .await?;
                Err(DomainError::StationUnavailable(station_id.to_owned()))
            }
        }
    }

    /// `On StartTransaction received` (spec.md §4.3). Binds the session
    /// whose `id_tag` matches; out-of-order or unmatched transactions are
    /// rejected without mutating state (spec.md §5, §8).
    pub async fn on_start_transaction(
        &self,
        id_tag: &str,
        ocpp_tx_id: i64,
        meter_start: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<ChargingSession>> {
        let Some(session) = self.repos.charging_sessions().find_by_id_tag(id_tag).await? else {
            return Ok(None);
        };
        if session.status != SessionStatus::Starting {
            return Ok(None);
        }
        let bound = self
            .repos
            .charging_sessions()
            .mark_active(&session.id, ocpp_tx_id, meter_start, now)
            .await?;
        if !bound {
            return Ok(None);
        }
        info!(session_id = %session.id, ocpp_tx_id, meter_start, "session active");
        Ok(self.repos.charging_sessions().find_by_id(&session.id).await?)
    }

    /// `On MeterValues received` (spec.md §4.3). Returns `true` if a
    /// RemoteStopTransaction was dispatched because the limit was reached.
    pub async fn on_meter_values(
        &self,
        station_id: &str,
        ocpp_tx_id: i64,
        meter_wh: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let Some(session) = self
            .repos
            .charging_sessions()
            .find_by_ocpp_tx_id(station_id, ocpp_tx_id)
            .await?
        else {
            return Ok(false);
        };
        if session.status != SessionStatus::Active {
            return Ok(false);
        }
        let meter_start = session.meter_start.unwrap_or(meter_wh);
        let energy_delivered_wh = (meter_wh - meter_start).max(0);
        let energy_kwh = Decimal::new(energy_delivered_wh, 0) / Decimal::new(1000, 0);

        let limit_reached = match session.limit_kind {
            LimitKind::Energy => energy_kwh >= session.limit_value,
            LimitKind::Amount => {
                let price = self
                    .repos
                    .tariffs()
                    .effective_price(station_id, now, self.default_tariff_price)
                    .await?;
                decimal_to_i64_ceil(energy_kwh * price)? >= session.reserved_amount
            }
        };

        if limit_reached {
            info!(session_id = %session.id, energy_delivered_wh, "limit reached, dispatching RemoteStopTransaction");
            let _ = self
                .command_router
                .publish(station_id, OutboundAction::RemoteStopTransaction { transaction_id: ocpp_tx_id });
        }
        Ok(limit_reached)
    }

    /// `On StopTransaction received` (spec.md §4.3). Computes and commits
    /// the final billing fields; the monetary invariant
    /// `amount_charged + refund_amount = reserved_amount` is established
    /// here and never revisited.
    pub async fn on_stop_transaction(
        &self,
        station_id: &str,
        ocpp_tx_id: i64,
        meter_stop: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<ChargingSession>> {
        let Some(session) = self
            .repos
            .charging_sessions()
            .find_by_ocpp_tx_id(station_id, ocpp_tx_id)
            .await?
        else {
            return Ok(None);
        };
        if !matches!(session.status, SessionStatus::Active | SessionStatus::Stopping) {
            return Ok(None);
        }
        let meter_start = session.meter_start.unwrap_or(meter_stop);
        let energy_delivered_wh = (meter_stop - meter_start).max(0);
        let energy_kwh = Decimal::new(energy_delivered_wh, 0) / Decimal::new(1000, 0);

        let price = self
            .repos
            .tariffs()
            .effective_price(station_id, now, self.default_tariff_price)
            .await?;
        let computed_charge = decimal_to_i64_ceil(energy_kwh * price)?;
        let amount_charged = computed_charge.min(session.reserved_amount).max(0);
        let refund_amount = session.reserved_amount - amount_charged;

        let outcome = StopOutcome {
            meter_stop,
            energy_delivered_wh,
            amount_charged,
            refund_amount,
            stopped_at: now,
        };
        let applied = self.repos.settle_stopped_session(&session.id, &session.client_id, outcome).await?;
        if !applied {
            return Ok(self.repos.charging_sessions().find_by_id(&session.id).await?);
        }
        info!(
            session_id = %session.id,
            amount_charged,
            refund_amount,
            energy_delivered_wh,
            "session stopped and settled"
        );
        Ok(self.repos.charging_sessions().find_by_id(&session.id).await?)
    }

    /// `StopCharge` (spec.md §4.3). Idempotent: a session already
    /// `stopping`/`stopped` is a no-op returning current state.
    pub async fn stop_charge(&self, session_id: &str) -> DomainResult<ChargingSession> {
        let session = self
            .repos
            .charging_sessions()
            .find_by_id(session_id)
            .await?
            .ok_or(DomainError::NotFound { entity: "charging_session", id: session_id.to_owned() })?;

        if matches!(session.status, SessionStatus::Stopped | SessionStatus::Failed | SessionStatus::Expired) {
            return Ok(session);
        }

        if session.status == SessionStatus::Active {
            self.repos.charging_sessions().mark_stopping(session_id).await?;
        }

        if let Some(ocpp_tx_id) = session.ocpp_tx_id {
            let _ = self
                .command_router
                .publish(&session.station_id, OutboundAction::RemoteStopTransaction { transaction_id: ocpp_tx_id });
        }

        Ok(self
            .repos
            .charging_sessions()
            .find_by_id(session_id)
            .await?
            .unwrap_or(session))
    }

    /// Marks any active session on a connector that just transitioned to
    /// `Faulted` as failed-pending-stop (spec.md §4.2). Reservation is
    /// refunded in full since no further energy is possible.
    pub async fn on_connector_faulted(&self, station_id: &str, connector_id: i32) -> DomainResult<()> {
        self.repos
            .connectors()
            .upsert_status(station_id, connector_id, ConnectorStatus::Faulted)
            .await?;

        let Some(session) = self
            .repos
            .charging_sessions()
            .find_live_for_connector(station_id, connector_id)
            .await?
        else {
            return Ok(());
        };

        warn!(session_id = %session.id, station_id, connector_id, "connector faulted, failing session");

        // Active/starting sessions refund in full; metering already applied
        // to `amount_charged` would require a stop, which a faulted
        // connector can no longer deliver.
        self.repos
            .settle_failed_session(&session.id, &session.client_id, Some(session.reserved_amount))
            .await?;
        Ok(())
    }
}
