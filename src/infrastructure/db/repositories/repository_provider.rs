//! SeaORM implementation of `RepositoryProvider` — one connection pool,
//! one repository struct per aggregate (spec.md §2; SPEC_FULL.md §3.1,
//! grounded on the teacher's `repository_provider.rs`).
//!
//! The cross-aggregate `settle_*`/`approve_invoice_and_credit` methods run
//! their conditional `UPDATE`s against a `DatabaseTransaction` rather than
//! the bare pool, reusing the exact SQL the single-aggregate repositories
//! above use against `&self.db` — `DatabaseTransaction` implements the same
//! `ConnectionTrait` a plain `DatabaseConnection` does, so the statements
//! are unchanged, only the handle they run against commits or rolls back
//! as one unit (spec.md §4.3, §4.6, §4.7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, Statement, TransactionError, TransactionTrait};

use crate::domain::repositories::{
    ChargingSessionRepository, ClientRepository, ConnectorRepository, IdempotencyRepository,
    InvoiceRepository, MeterSampleRepository, RepositoryProvider, StationRepository,
    StopOutcome, TariffRepository,
};
use crate::domain::{InvoiceStatus, SessionStatus};
use crate::shared::errors::{DomainError, DomainResult};

use super::charging_session_repository::SeaOrmChargingSessionRepository;
use super::client_repository::SeaOrmClientRepository;
use super::connector_repository::SeaOrmConnectorRepository;
use super::idempotency_repository::SeaOrmIdempotencyRepository;
use super::invoice_repository::SeaOrmInvoiceRepository;
use super::meter_sample_repository::SeaOrmMeterSampleRepository;
use super::station_repository::SeaOrmStationRepository;
use super::tariff_repository::SeaOrmTariffRepository;

pub struct SeaOrmRepositoryProvider {
    db: DatabaseConnection,
    clients: SeaOrmClientRepository,
    stations: SeaOrmStationRepository,
    connectors: SeaOrmConnectorRepository,
    charging_sessions: SeaOrmChargingSessionRepository,
    tariffs: SeaOrmTariffRepository,
    invoices: SeaOrmInvoiceRepository,
    meter_samples: SeaOrmMeterSampleRepository,
    idempotency: SeaOrmIdempotencyRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            clients: SeaOrmClientRepository::new(db.clone()),
            stations: SeaOrmStationRepository::new(db.clone()),
            connectors: SeaOrmConnectorRepository::new(db.clone()),
            charging_sessions: SeaOrmChargingSessionRepository::new(db.clone()),
            tariffs: SeaOrmTariffRepository::new(db.clone()),
            invoices: SeaOrmInvoiceRepository::new(db.clone()),
            meter_samples: SeaOrmMeterSampleRepository::new(db.clone()),
            idempotency: SeaOrmIdempotencyRepository::new(db.clone()),
            db,
        }
    }
}

/// Flattens sea_orm's two-variant transaction error into the crate's own
/// taxonomy — a connection-level failure and a callback-returned
/// `DomainError` both surface identically to callers.
fn flatten_txn_error(e: TransactionError<DomainError>) -> DomainError {
    match e {
        TransactionError::Connection(db_err) => DomainError::from(db_err),
        TransactionError::Transaction(domain_err) => domain_err,
    }
}

async fn credit_client(txn: &DatabaseTransaction, client_id: &str, amount: i64) -> DomainResult<()> {
    let backend = txn.get_database_backend();
    let stmt = Statement::from_sql_and_values(
        backend,
        "UPDATE clients SET balance = balance + ? WHERE id = ?",
        [amount.into(), client_id.into()],
    );
    txn.execute(stmt).await?;
    Ok(())
}

#[async_trait]
impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn clients(&self) -> &dyn ClientRepository {
        &self.clients
    }

    fn stations(&self) -> &dyn StationRepository {
        &self.stations
    }

    fn connectors(&self) -> &dyn ConnectorRepository {
        &self.connectors
    }

    fn charging_sessions(&self) -> &dyn ChargingSessionRepository {
        &self.charging_sessions
    }

    fn tariffs(&self) -> &dyn TariffRepository {
        &self.tariffs
    }

    fn invoices(&self) -> &dyn InvoiceRepository {
        &self.invoices
    }

    fn meter_samples(&self) -> &dyn MeterSampleRepository {
        &self.meter_samples
    }

    fn idempotency(&self) -> &dyn IdempotencyRepository {
        &self.idempotency
    }

    async fn approve_invoice_and_credit(
        &self,
        provider_order_id: &str,
        client_id: &str,
        amount_paid: i64,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let provider_order_id = provider_order_id.to_owned();
        let client_id = client_id.to_owned();
        self.db
            .transaction::<_, bool, DomainError>(move |txn| {
                Box::pin(async move {
                    let backend = txn.get_database_backend();
                    let stmt = Statement::from_sql_and_values(
                        backend,
                        "UPDATE top_ups SET status = ?, amount_paid = ?, paid_at = ? \
                         WHERE provider_order_id = ? AND status != ?",
                        [
                            InvoiceStatus::Approved.as_str().into(),
                            amount_paid.into(),
                            paid_at.into(),
                            provider_order_id.as_str().into(),
                            InvoiceStatus::Approved.as_str().into(),
                        ],
                    );
                    let result = txn.execute(stmt).await?;
                    if result.rows_affected() == 0 {
                        return Ok(false);
                    }
                    credit_client(txn, &client_id, amount_paid).await?;
                    Ok(true)
                })
            })
            .await
            .map_err(flatten_txn_error)
    }

    async fn settle_stopped_session(
        &self,
        session_id: &str,
        client_id: &str,
        outcome: StopOutcome,
    ) -> DomainResult<bool> {
        let session_id = session_id.to_owned();
        let client_id = client_id.to_owned();
        self.db
            .transaction::<_, bool, DomainError>(move |txn| {
                Box::pin(async move {
                    let backend = txn.get_database_backend();
                    let stmt = Statement::from_sql_and_values(
                        backend,
                        "UPDATE charging_sessions \
                         SET status = ?, meter_stop = ?, energy_delivered_wh = ?, amount_charged = ?, \
                             refund_amount = ?, stopped_at = ? \
                         WHERE id = ? AND status IN ('active', 'stopping')",
                        [
                            SessionStatus::Stopped.as_str().into(),
                            outcome.meter_stop.into(),
                            outcome.energy_delivered_wh.into(),
                            outcome.amount_charged.into(),
                            outcome.refund_amount.into(),
                            outcome.stopped_at.into(),
                            session_id.as_str().into(),
                        ],
                    );
                    let result = txn.execute(stmt).await?;
                    if result.rows_affected() == 0 {
                        return Ok(false);
                    }
                    if outcome.refund_amount > 0 {
                        credit_client(txn, &client_id, outcome.refund_amount).await?;
                    }
                    Ok(true)
                })
            })
            .await
            .map_err(flatten_txn_error)
    }

    async fn settle_expired_session(
        &self,
        session_id: &str,
        client_id: &str,
        refund_amount: i64,
    ) -> DomainResult<bool> {
        let session_id = session_id.to_owned();
        let client_id = client_id.to_owned();
        self.db
            .transaction::<_, bool, DomainError>(move |txn| {
                Box::pin(async move {
                    let backend = txn.get_database_backend();
                    let now = Utc::now();
                    let stmt = Statement::from_sql_and_values(
                        backend,
                        "UPDATE charging_sessions SET status = ?, refund_amount = ?, stopped_at = ? \
                         WHERE id = ? AND status = ?",
                        [
                            SessionStatus::Expired.as_str().into(),
                            refund_amount.into(),
                            now.into(),
                            session_id.as_str().into(),
                            SessionStatus::Starting.as_str().into(),
                        ],
                    );
                    let result = txn.execute(stmt).await?;
                    if result.rows_affected() == 0 {
                        return Ok(false);
                    }
                    if refund_amount > 0 {
                        credit_client(txn, &client_id, refund_amount).await?;
                    }
                    Ok(true)
                })
            })
            .await
            .map_err(flatten_txn_error)
    }

    async fn settle_failed_session(
        &self,
        session_id: &str,
        client_id: &str,
        refund_amount: Option<i64>,
    ) -> DomainResult<bool> {
        let session_id = session_id.to_owned();
        let client_id = client_id.to_owned();
        self.db
            .transaction::<_, bool, DomainError>(move |txn| {
                Box::pin(async move {
                    let backend = txn.get_database_backend();
                    let now = Utc::now();
                    let stmt = Statement::from_sql_and_values(
                        backend,
                        "UPDATE charging_sessions SET status = ?, refund_amount = ?, stopped_at = ? \
                         WHERE id = ? AND status NOT IN ('stopped', 'failed', 'expired')",
                        [
                            SessionStatus::Failed.as_str().into(),
                            refund_amount.into(),
                            now.into(),
                            session_id.as_str().into(),
                        ],
                    );
                    let result = txn.execute(stmt).await?;
                    if result.rows_affected() == 0 {
                        return Ok(false);
                    }
                    if let Some(amount) = refund_amount {
                        if amount > 0 {
                            credit_client(txn, &client_id, amount).await?;
                        }
                    }
                    Ok(true)
                })
            })
            .await
            .map_err(flatten_txn_error)
    }
}
