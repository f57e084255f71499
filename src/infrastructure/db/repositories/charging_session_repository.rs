//! SeaORM implementation of `ChargingSessionRepository`.
//!
//! State transitions (`mark_*`) are expressed as conditional `UPDATE`s
//! scoped by the expected prior status, mirroring the client balance's
//! compare-and-set pattern so concurrent StopTransaction/reconciler races
//! can't double-apply a transition (spec.md §5, §8).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, Statement,
};
use std::str::FromStr;

use crate::domain::repositories::{ChargingSessionRepository, StopOutcome};
use crate::domain::{ChargingSession, LimitKind, SessionStatus};
use crate::infrastructure::db::entities::{charging_session, meter_sample};
use crate::shared::errors::{DomainError, DomainResult};

pub struct SeaOrmChargingSessionRepository {
    db: DatabaseConnection,
}

impl SeaOrmChargingSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: charging_session::Model) -> DomainResult<ChargingSession> {
    let limit_value = Decimal::from_str(&m.limit_value)
        .map_err(|e| DomainError::Internal(format!("limit_value decode: {e}")))?;
    Ok(ChargingSession {
        id: m.id,
        client_id: m.client_id,
        station_id: m.station_id,
        connector_id: m.connector_id,
        limit_kind: LimitKind::from_str(&m.limit_kind)
            .ok_or_else(|| DomainError::Internal("invalid limit_kind in row".into()))?,
        limit_value,
        reserved_amount: m.reserved_amount,
        id_tag: m.id_tag,
        ocpp_tx_id: m.ocpp_tx_id,
        meter_start: m.meter_start,
        meter_stop: m.meter_stop,
        energy_delivered_wh: m.energy_delivered_wh,
        amount_charged: m.amount_charged,
        refund_amount: m.refund_amount,
        status: SessionStatus::from_str(&m.status)
            .ok_or_else(|| DomainError::Internal("invalid status in row".into()))?,
        created_at: m.created_at,
        started_at: m.started_at,
        stopped_at: m.stopped_at,
    })
}

const LIVE_STATUSES: [&str; 4] = ["pending", "starting", "active", "stopping"];

#[async_trait]
impl ChargingSessionRepository for SeaOrmChargingSessionRepository {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ChargingSession>> {
        let model = charging_session::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_id_tag(&self, id_tag: &str) -> DomainResult<Option<ChargingSession>> {
        let model = charging_session::Entity::find()
            .filter(charging_session::Column::IdTag.eq(id_tag))
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_ocpp_tx_id(
        &self,
        station_id: &str,
        ocpp_tx_id: i64,
    ) -> DomainResult<Option<ChargingSession>> {
        let model = charging_session::Entity::find()
            .filter(charging_session::Column::StationId.eq(station_id))
            .filter(charging_session::Column::OcppTxId.eq(ocpp_tx_id))
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn has_live_for_client(&self, client_id: &str) -> DomainResult<bool> {
        let count = charging_session::Entity::find()
            .filter(charging_session::Column::ClientId.eq(client_id))
            .filter(charging_session::Column::Status.is_in(LIVE_STATUSES))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn has_live_for_connector(
        &self,
        station_id: &str,
        connector_id: i32,
    ) -> DomainResult<bool> {
        let count = charging_session::Entity::find()
            .filter(charging_session::Column::StationId.eq(station_id))
            .filter(charging_session::Column::ConnectorId.eq(connector_id))
            .filter(charging_session::Column::Status.is_in(LIVE_STATUSES))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn find_live_for_connector(
        &self,
        station_id: &str,
        connector_id: i32,
    ) -> DomainResult<Option<ChargingSession>> {
        let model = charging_session::Entity::find()
            .filter(charging_session::Column::StationId.eq(station_id))
            .filter(charging_session::Column::ConnectorId.eq(connector_id))
            .filter(charging_session::Column::Status.is_in(LIVE_STATUSES))
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn insert_pending(&self, session: ChargingSession) -> DomainResult<()> {
        let active = charging_session::ActiveModel {
            id: Set(session.id),
            client_id: Set(session.client_id),
            station_id: Set(session.station_id),
            connector_id: Set(session.connector_id),
            limit_kind: Set(session.limit_kind.as_str().to_owned()),
            limit_value: Set(session.limit_value.to_string()),
            reserved_amount: Set(session.reserved_amount),
            id_tag: Set(session.id_tag),
            ocpp_tx_id: Set(None),
            meter_start: Set(None),
            meter_stop: Set(None),
            energy_delivered_wh: Set(None),
            amount_charged: Set(None),
            refund_amount: Set(None),
            status: Set(SessionStatus::Pending.as_str().to_owned()),
            created_at: Set(session.created_at),
            started_at: Set(None),
            stopped_at: Set(None),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn mark_starting(&self, id: &str) -> DomainResult<()> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE charging_sessions SET status = ? WHERE id = ? AND status = ?",
            [
                SessionStatus::Starting.as_str().into(),
                id.into(),
                SessionStatus::Pending.as_str().into(),
            ],
        );
        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn mark_active(
        &self,
        id: &str,
        ocpp_tx_id: i64,
        meter_start: i64,
        started_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE charging_sessions SET status = ?, ocpp_tx_id = ?, meter_start = ?, started_at = ? \
             WHERE id = ? AND status = ?",
            [
                SessionStatus::Active.as_str().into(),
                ocpp_tx_id.into(),
                meter_start.into(),
                started_at.into(),
                id.into(),
                SessionStatus::Starting.as_str().into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_stopping(&self, id: &str) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE charging_sessions SET status = ? WHERE id = ? AND status = ?",
            [
                SessionStatus::Stopping.as_str().into(),
                id.into(),
                SessionStatus::Active.as_str().into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_stopped(&self, id: &str, outcome: StopOutcome) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
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
                id.into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: &str, refund_amount: Option<i64>) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE charging_sessions SET status = ?, refund_amount = ?, stopped_at = ? \
             WHERE id = ? AND status NOT IN ('stopped', 'failed', 'expired')",
            [
                SessionStatus::Failed.as_str().into(),
                refund_amount.into(),
                Utc::now().into(),
                id.into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_expired(&self, id: &str, refund_amount: i64) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE charging_sessions SET status = ?, refund_amount = ?, stopped_at = ? \
             WHERE id = ? AND status = ?",
            [
                SessionStatus::Expired.as_str().into(),
                refund_amount.into(),
                Utc::now().into(),
                id.into(),
                SessionStatus::Starting.as_str().into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_starting_older_than(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<ChargingSession>> {
        let models = charging_session::Entity::find()
            .filter(charging_session::Column::Status.eq(SessionStatus::Starting.as_str()))
            .filter(charging_session::Column::CreatedAt.lt(threshold))
            .filter(
                Condition::all().add(charging_session::Column::OcppTxId.is_null()),
            )
            .all(&self.db)
            .await?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn find_active_older_than(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<ChargingSession>> {
        let models = charging_session::Entity::find()
            .filter(charging_session::Column::Status.eq(SessionStatus::Active.as_str()))
            .filter(charging_session::Column::CreatedAt.lt(threshold))
            .all(&self.db)
            .await?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn last_meter_reading(&self, session_id: &str) -> DomainResult<Option<i64>> {
        let model = meter_sample::Entity::find()
            .filter(meter_sample::Column::SessionId.eq(session_id))
            .order_by_desc(meter_sample::Column::Timestamp)
            .one(&self.db)
            .await?;
        Ok(model.map(|m| m.meter_wh))
    }
}
