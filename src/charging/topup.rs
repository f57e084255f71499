//! Top-up orchestration (spec.md §4.7, §4.8) — creates invoices through the
//! Payment Provider Adapter and applies the webhook credit. Built in the
//! idiom of `ChargingLifecycleEngine` (service struct over
//! `Arc<dyn RepositoryProvider>`, `DomainResult<T>`, `tracing::info!` on the
//! monetary fields it just computed) since the teacher has no wallet
//! top-up concept at all.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::repositories::{ClientRepository, InvoiceRepository};
use crate::domain::{Invoice, InvoiceStatus, RepositoryProvider};
use crate::infrastructure::provider::PaymentProvider;
use crate::shared::errors::{DomainError, DomainResult};

/// A freshly created invoice plus the provider's one-time QR payload, which
/// isn't persisted (only the invoice row survives) — an idempotent replay of
/// `create_topup` therefore returns the original invoice without it.
pub struct TopUpResult {
    pub invoice: Invoice,
    pub qr_payload: Option<String>,
}

pub struct TopUpService {
    repos: Arc<dyn RepositoryProvider>,
    provider: Arc<dyn PaymentProvider>,
    currency: String,
}

impl TopUpService {
    pub fn new(repos: Arc<dyn RepositoryProvider>, provider: Arc<dyn PaymentProvider>, currency: String) -> Self {
        Self { repos, provider, currency }
    }

    /// `POST /balance/topup` (spec.md §4.8). Idempotent on
    /// `(client_id, idempotency_key)` within 24h — a repeat call with the
    /// same key returns the original invoice rather than creating a second
    /// one with the provider.
    pub async fn create_topup(
        &self,
        client_id: &str,
        amount: i64,
        idempotency_key: Option<&str>,
    ) -> DomainResult<TopUpResult> {
        if amount <= 0 {
            return Err(DomainError::InvalidArgument("amount must be positive".into()));
        }
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.repos.invoices().find_by_idempotency_key(client_id, key).await? {
                return Ok(TopUpResult { invoice: existing, qr_payload: None });
            }
        }

        let created = self.provider.create_invoice(client_id, amount, &self.currency).await?;
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_owned(),
            provider_order_id: created.provider_order_id,
            amount_requested: amount,
            amount_paid: None,
            status: InvoiceStatus::Pending,
            expires_at: created.expires_at,
            idempotency_key: idempotency_key.map(str::to_owned),
            created_at: Utc::now(),
            paid_at: None,
        };
        self.repos.invoices().insert_pending(invoice.clone()).await?;
        info!(client_id, amount, provider_order_id = invoice.provider_order_id.as_str(), "top-up invoice created");
        Ok(TopUpResult { invoice, qr_payload: Some(created.qr_payload) })
    }

    /// `POST /payment/webhook` (spec.md §4.7, §6). Verifies the signature,
    /// parses the payload, and applies the credit exactly once regardless
    /// of redelivery — the approve-and-credit transaction's conditional
    /// `UPDATE` is the idempotency boundary, and commits the status flip and
    /// the balance credit together so a crash between them can never strand
    /// an `approved` invoice with an uncredited balance (spec.md §8 "webhook
    /// idempotency", "monetary conservation").
    pub async fn handle_webhook(&self, raw_body: &[u8], signature_header: &str) -> DomainResult<&'static str> {
        if !self.provider.verify_signature(raw_body, signature_header) {
            return Err(DomainError::Unauthenticated);
        }
        let payload = self.provider.parse_webhook(raw_body)?;
        if !payload.is_approved() {
            info!(provider_order_id = payload.provider_order_id.as_str(), status = payload.status.as_str(), "webhook reported non-approved status");
            return Ok(self.provider.ack_body());
        }

        let Some(invoice) = self.repos.invoices().find_by_provider_order_id(&payload.provider_order_id).await? else {
            warn!(provider_order_id = payload.provider_order_id.as_str(), "webhook for unknown invoice");
            return Ok(self.provider.ack_body());
        };

        let now = Utc::now();
        let credited = self
            .repos
            .approve_invoice_and_credit(&payload.provider_order_id, &invoice.client_id, payload.paid_amount, now)
            .await?;
        if credited {
            info!(
                client_id = invoice.client_id.as_str(),
                provider_order_id = payload.provider_order_id.as_str(),
                paid_amount = payload.paid_amount,
                "top-up approved and credited"
            );
        } else {
            info!(provider_order_id = payload.provider_order_id.as_str(), "webhook replay, already approved, no-op");
        }
        Ok(self.provider.ack_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::infrastructure::db::repositories::repository_provider::SeaOrmRepositoryProvider;
    use crate::infrastructure::db::{connect_and_migrate, entities::client};
    use crate::infrastructure::provider::{InvoiceCreated, WebhookPayload};
    use sea_orm::{ActiveModelTrait, Set};

    /// Always produces order id `order-1`; `approved` controls whether
    /// `parse_webhook` reports an approved status, and `invocations` counts
    /// calls to `create_invoice` so idempotent replays of `create_topup` can
    /// be asserted to have skipped the provider entirely.
    struct FakeProvider {
        approved: bool,
        paid_amount: i64,
        invocations: AtomicUsize,
    }

    impl FakeProvider {
        fn new(paid_amount: i64, approved: bool) -> Self {
            Self { approved, paid_amount, invocations: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PaymentProvider for FakeProvider {
        async fn create_invoice(&self, _client_id: &str, _amount: i64, _currency: &str) -> DomainResult<InvoiceCreated> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(InvoiceCreated {
                provider_order_id: "order-1".to_owned(),
                qr_payload: "qr-payload".to_owned(),
                expires_at: Utc::now() + ChronoDuration::minutes(15),
            })
        }

        fn verify_signature(&self, _raw_body: &[u8], signature_header: &str) -> bool {
            signature_header == "valid-signature"
        }

        fn parse_webhook(&self, _raw_body: &[u8]) -> DomainResult<WebhookPayload> {
            Ok(WebhookPayload {
                provider_order_id: "order-1".to_owned(),
                status: if self.approved { "approved".to_owned() } else { "declined".to_owned() },
                paid_amount: self.paid_amount,
            })
        }

        fn ack_body(&self) -> &'static str {
            "OK"
        }
    }

    async fn harness(paid_amount: i64, approved: bool) -> (TopUpService, Arc<SeaOrmRepositoryProvider>, Arc<FakeProvider>) {
        let db = connect_and_migrate("sqlite::memory:").await.expect("connect");
        client::ActiveModel {
            id: Set("client-1".to_owned()),
            balance: Set(1_000),
            currency: Set("som".to_owned()),
        }
        .insert(&db)
        .await
        .expect("seed client");

        let repos = Arc::new(SeaOrmRepositoryProvider::new(db));
        let provider = Arc::new(FakeProvider::new(paid_amount, approved));
        let service = TopUpService::new(repos.clone(), provider.clone(), "som".to_owned());
        (service, repos, provider)
    }

    #[tokio::test]
    async fn create_topup_rejects_non_positive_amount() {
        let (service, _repos, _provider) = harness(500, true).await;
        let err = service.create_topup("client-1", 0, None).await.unwrap_err();
        assert_eq!(err, DomainError::InvalidArgument("amount must be positive".into()));
    }

    #[tokio::test]
    async fn create_topup_replay_with_same_idempotency_key_skips_the_provider() {
        let (service, _repos, provider) = harness(500, true).await;

        let first = service.create_topup("client-1", 500, Some("key-1")).await.unwrap();
        assert!(first.qr_payload.is_some());

        let second = service.create_topup("client-1", 500, Some("key-1")).await.unwrap();
        assert_eq!(second.invoice.id, first.invoice.id);
        assert!(second.qr_payload.is_none(), "replay does not re-expose the one-time QR payload");
        assert_eq!(provider.invocations.load(Ordering::SeqCst), 1, "provider is only called once for the same idempotency key");
    }

    #[tokio::test]
    async fn webhook_is_rejected_when_signature_does_not_verify() {
        let (service, _repos, _provider) = harness(500, true).await;
        let err = service.handle_webhook(b"{}", "bad-signature").await.unwrap_err();
        assert_eq!(err, DomainError::Unauthenticated);
    }

    #[tokio::test]
    async fn webhook_credits_exactly_once_across_repeated_deliveries() {
        let (service, repos, _provider) = harness(500, true).await;
        service.create_topup("client-1", 500, None).await.unwrap();

        for _ in 0..3 {
            let ack = service.handle_webhook(b"{}", "valid-signature").await.unwrap();
            assert_eq!(ack, "OK");
        }

        let balance = repos.clients().find_by_id("client-1").await.unwrap().unwrap().balance;
        assert_eq!(balance, 1_500, "three redeliveries of the same approved webhook yield exactly one credit");

        let invoice = repos.invoices().find_by_provider_order_id("order-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);
        assert_eq!(invoice.amount_paid, Some(500));
    }

    #[tokio::test]
    async fn webhook_for_unknown_order_is_acked_without_crediting() {
        let (service, repos, _provider) = harness(500, true).await;
        let ack = service.handle_webhook(b"{}", "valid-signature").await.unwrap();
        assert_eq!(ack, "OK");
        let balance = repos.clients().find_by_id("client-1").await.unwrap().unwrap().balance;
        assert_eq!(balance, 1_000, "no invoice for this order id means no credit is applied");
    }

    #[tokio::test]
    async fn webhook_with_non_approved_status_does_not_credit() {
        let (service, repos, _provider) = harness(500, false).await;
        service.create_topup("client-1", 500, None).await.unwrap();

        let ack = service.handle_webhook(b"{}", "valid-signature").await.unwrap();
        assert_eq!(ack, "OK");

        let balance = repos.clients().find_by_id("client-1").await.unwrap().unwrap().balance;
        assert_eq!(balance, 1_000);
        let invoice = repos.invoices().find_by_provider_order_id("order-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }
}
