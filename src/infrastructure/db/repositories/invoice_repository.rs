//! SeaORM implementation of `InvoiceRepository` (spec.md §4.7, §8).
//!
//! `approve` is the webhook-idempotency boundary: the conditional `UPDATE`
//! only fires while the row is not already `approved`, so delivering the
//! same webhook N times credits the client exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, Statement,
};

use crate::domain::repositories::InvoiceRepository;
use crate::domain::{Invoice, InvoiceStatus};
use crate::infrastructure::db::entities::top_up;
use crate::shared::errors::{DomainError, DomainResult};

pub struct SeaOrmInvoiceRepository {
    db: DatabaseConnection,
}

impl SeaOrmInvoiceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: top_up::Model) -> DomainResult<Invoice> {
    Ok(Invoice {
        id: m.id,
        client_id: m.client_id,
        provider_order_id: m.provider_order_id,
        amount_requested: m.amount_requested,
        amount_paid: m.amount_paid,
        status: InvoiceStatus::from_str(&m.status)
            .ok_or_else(|| DomainError::Internal("invalid top_up status in row".into()))?,
        expires_at: m.expires_at,
        idempotency_key: m.idempotency_key,
        created_at: m.created_at,
        paid_at: m.paid_at,
    })
}

#[async_trait]
impl InvoiceRepository for SeaOrmInvoiceRepository {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Invoice>> {
        let model = top_up::Entity::find_by_id(id.to_owned()).one(&self.db).await?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> DomainResult<Option<Invoice>> {
        let model = top_up::Entity::find()
            .filter(top_up::Column::ProviderOrderId.eq(provider_order_id))
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        client_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<Option<Invoice>> {
        let model = top_up::Entity::find()
            .filter(top_up::Column::ClientId.eq(client_id))
            .filter(top_up::Column::IdempotencyKey.eq(idempotency_key))
            .one(&self.db)
            .await?;
        model.map(model_to_domain).transpose()
    }

    async fn insert_pending(&self, invoice: Invoice) -> DomainResult<()> {
        let active = top_up::ActiveModel {
            id: Set(invoice.id),
            client_id: Set(invoice.client_id),
            provider_order_id: Set(invoice.provider_order_id),
            amount_requested: Set(invoice.amount_requested),
            amount_paid: Set(None),
            status: Set(InvoiceStatus::Pending.as_str().to_owned()),
            expires_at: Set(invoice.expires_at),
            idempotency_key: Set(invoice.idempotency_key),
            created_at: Set(invoice.created_at),
            paid_at: Set(None),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn approve(
        &self,
        provider_order_id: &str,
        amount_paid: i64,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE top_ups SET status = ?, amount_paid = ?, paid_at = ? \
             WHERE provider_order_id = ? AND status != ?",
            [
                InvoiceStatus::Approved.as_str().into(),
                amount_paid.into(),
                paid_at.into(),
                provider_order_id.into(),
                InvoiceStatus::Approved.as_str().into(),
            ],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> DomainResult<Vec<Invoice>> {
        let models = top_up::Entity::find()
            .filter(top_up::Column::Status.eq(InvoiceStatus::Pending.as_str()))
            .filter(top_up::Column::ExpiresAt.lt(now))
            .all(&self.db)
            .await?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn mark_expired(&self, id: &str) -> DomainResult<()> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE top_ups SET status = ? WHERE id = ? AND status = ?",
            [
                InvoiceStatus::Expired.as_str().into(),
                id.into(),
                InvoiceStatus::Pending.as_str().into(),
            ],
        );
        self.db.execute(stmt).await?;
        Ok(())
    }
}
