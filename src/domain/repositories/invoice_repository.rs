//! InvoiceRepository — typed operations over `top_ups` (spec.md §3, §4.7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::Invoice;
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Invoice>>;

    async fn find_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> DomainResult<Option<Invoice>>;

    /// Idempotency lookup for `POST /balance/topup` (spec.md §4.8): a prior
    /// invoice for the same `(client_id, idempotency_key)` within 24h.
    async fn find_by_idempotency_key(
        &self,
        client_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<Option<Invoice>>;

    async fn insert_pending(&self, invoice: Invoice) -> DomainResult<()>;

    /// Approval is terminal and monotonic (spec.md §3): a no-op if the row is
    /// already `Approved`. Returns `true` if this call performed the credit.
    async fn approve(
        &self,
        provider_order_id: &str,
        amount_paid: i64,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Invoice sweep: `pending` rows whose `expires_at < now` (spec.md §4.6).
    /// Never returns rows already in a terminal state.
    async fn find_expired_pending(&self, now: DateTime<Utc>) -> DomainResult<Vec<Invoice>>;

    async fn mark_expired(&self, id: &str) -> DomainResult<()>;
}
