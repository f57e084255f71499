//! ChargingSessionRepository — the central aggregate's data-access contract
//! (spec.md §3, §4.3, §8).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ChargingSession;
use crate::shared::errors::DomainResult;

/// Fields finalized by StopTransaction (spec.md §4.3 step 1-4).
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub meter_stop: i64,
    pub energy_delivered_wh: i64,
    pub amount_charged: i64,
    pub refund_amount: i64,
    pub stopped_at: DateTime<Utc>,
}

#[async_trait]
pub trait ChargingSessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ChargingSession>>;

    /// Session whose `id_tag` matches, used to bind an inbound StartTransaction
    /// to the pending session that requested it (spec.md §4.2).
    async fn find_by_id_tag(&self, id_tag: &str) -> DomainResult<Option<ChargingSession>>;

    async fn find_by_ocpp_tx_id(
        &self,
        station_id: &str,
        ocpp_tx_id: i64,
    ) -> DomainResult<Option<ChargingSession>>;

    /// True if a live session (`is_live()`) already exists for this client —
    /// "at most one active charge per client" (spec.md §3, §8).
    async fn has_live_for_client(&self, client_id: &str) -> DomainResult<bool>;

    /// True if a live session already exists for this connector — "at most
    /// one active charge per connector" (spec.md §3, §8).
    async fn has_live_for_connector(
        &self,
        station_id: &str,
        connector_id: i32,
    ) -> DomainResult<bool>;

    /// The live session occupying this connector, if any — used by the
    /// StatusNotification Faulted handler (spec.md §4.2).
    async fn find_live_for_connector(
        &self,
        station_id: &str,
        connector_id: i32,
    ) -> DomainResult<Option<ChargingSession>>;

    async fn insert_pending(&self, session: ChargingSession) -> DomainResult<()>;

    async fn mark_starting(&self, id: &str) -> DomainResult<()>;

    /// `starting -> active`, recording `started_at`/`meter_start`/`ocpp_tx_id`.
    /// No-op (returns `Ok(false)`) if the session isn't in `starting`.
    async fn mark_active(
        &self,
        id: &str,
        ocpp_tx_id: i64,
        meter_start: i64,
        started_at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    async fn mark_stopping(&self, id: &str) -> DomainResult<bool>;

    /// `active|stopping -> stopped`, with the computed billing fields.
    /// No-op (returns `Ok(false)`) if the session is already terminal.
    async fn mark_stopped(&self, id: &str, outcome: StopOutcome) -> DomainResult<bool>;

    async fn mark_failed(&self, id: &str, refund_amount: Option<i64>) -> DomainResult<bool>;

    async fn mark_expired(&self, id: &str, refund_amount: i64) -> DomainResult<bool>;

    /// Hung-session sweep inputs (spec.md §4.6).
    async fn find_starting_older_than(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<ChargingSession>>;

    async fn find_active_older_than(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<ChargingSession>>;

    /// Most recent meter sample reading recorded for the session, used by the
    /// reconciler's force-stop fallback when no StopTransaction ever arrives
    /// (spec.md §4.6).
    async fn last_meter_reading(&self, session_id: &str) -> DomainResult<Option<i64>>;
}
