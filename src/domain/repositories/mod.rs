//! Data-Access Gateway — typed repository traits over the persisted
//! entities, one per aggregate (spec.md §2, §3; SPEC_FULL.md §3.1).
//!
//! `RepositoryProvider` bundles accessors the way
//! `infrastructure::db::repositories::SeaOrmRepositoryProvider` implements
//! them once against a single connection pool.

pub mod charging_session_repository;
pub mod client_repository;
pub mod connector_repository;
pub mod idempotency_repository;
pub mod invoice_repository;
pub mod meter_sample_repository;
pub mod station_repository;
pub mod tariff_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::errors::DomainResult;

pub use charging_session_repository::{ChargingSessionRepository, StopOutcome};
pub use client_repository::ClientRepository;
pub use connector_repository::ConnectorRepository;
pub use idempotency_repository::{CachedResponse, IdempotencyRepository};
pub use invoice_repository::InvoiceRepository;
pub use meter_sample_repository::MeterSampleRepository;
pub use station_repository::StationRepository;
pub use tariff_repository::TariffRepository;

/// Unified access to all per-aggregate repositories, implemented once by
/// `SeaOrmRepositoryProvider` against a single connection pool.
///
/// The `settle_*`/`approve_invoice_and_credit` methods below are the
/// gateway's cross-aggregate operations: each commits a charging-session or
/// invoice status transition together with the client-balance credit it
/// implies in a single DB transaction, per spec.md §4.3/§4.6/§4.7's
/// repeated "in one transaction" requirement — a session or invoice must
/// never be left terminal with a refund/payment recorded that was never
/// actually applied to the balance.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    fn clients(&self) -> &dyn ClientRepository;
    fn stations(&self) -> &dyn StationRepository;
    fn connectors(&self) -> &dyn ConnectorRepository;
    fn charging_sessions(&self) -> &dyn ChargingSessionRepository;
    fn tariffs(&self) -> &dyn TariffRepository;
    fn invoices(&self) -> &dyn InvoiceRepository;
    fn meter_samples(&self) -> &dyn MeterSampleRepository;
    fn idempotency(&self) -> &dyn IdempotencyRepository;

    /// Approves a top-up invoice and credits `client_id`'s balance
    /// atomically (spec.md §4.7). A no-op (`Ok(false)`) if the invoice is
    /// already `approved` — the webhook-idempotency boundary.
    async fn approve_invoice_and_credit(
        &self,
        provider_order_id: &str,
        client_id: &str,
        amount_paid: i64,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Finalizes a `StopTransaction` and credits any refund atomically
    /// (spec.md §4.3 step 3).
    async fn settle_stopped_session(
        &self,
        session_id: &str,
        client_id: &str,
        outcome: StopOutcome,
    ) -> DomainResult<bool>;

    /// Expires a no-plug session stuck in `starting` and refunds it in full
    /// atomically (spec.md §4.6).
    async fn settle_expired_session(
        &self,
        session_id: &str,
        client_id: &str,
        refund_amount: i64,
    ) -> DomainResult<bool>;

    /// Fails a session (connector fault, or reconciler force-stop) and
    /// credits its refund, if any, atomically (spec.md §4.2, §4.6).
    async fn settle_failed_session(
        &self,
        session_id: &str,
        client_id: &str,
        refund_amount: Option<i64>,
    ) -> DomainResult<bool>;
}
