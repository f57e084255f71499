//! Payment Provider Adapter (spec.md §4.7; SPEC_FULL.md §3.3).
//!
//! Outbound invoice creation and inbound webhook parsing/verification behind
//! one trait; `provider_kind` in config selects the concrete adapter.

pub mod provider_a;
pub mod provider_b;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::{ProviderConfig, ProviderKind};
use crate::shared::errors::{DomainError, DomainResult};

#[derive(Debug, Clone)]
pub struct InvoiceCreated {
    pub provider_order_id: String,
    pub qr_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub provider_order_id: String,
    pub status: String,
    pub paid_amount: i64,
}

impl WebhookPayload {
    pub fn is_approved(&self) -> bool {
        self.status.eq_ignore_ascii_case("approved") || self.status.eq_ignore_ascii_case("paid")
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_invoice(
        &self,
        client_id: &str,
        amount: i64,
        currency: &str,
    ) -> DomainResult<InvoiceCreated>;

    /// `X-Signature`-style HMAC check over the raw webhook body.
    fn verify_signature(&self, raw_body: &[u8], signature_header: &str) -> bool;

    fn parse_webhook(&self, raw_body: &[u8]) -> DomainResult<WebhookPayload>;

    /// Provider's expected acknowledgment string, echoed back as the webhook
    /// HTTP response body (spec.md §6).
    fn ack_body(&self) -> &'static str;
}

pub fn build_provider(config: &ProviderConfig) -> Arc<dyn PaymentProvider> {
    match config.provider_kind {
        ProviderKind::ProviderA => Arc::new(provider_a::ProviderA::new(config.clone())),
        ProviderKind::ProviderB => Arc::new(provider_b::ProviderB::new(config.clone())),
    }
}

/// Retries a transient provider call up to 3 attempts with exponential
/// back-off starting at 500 ms (spec.md §7). The closure decides whether a
/// given failure is transient by returning `Err(true)` (retry) or
/// `Err(false)` (permanent, surfaced immediately).
pub(crate) async fn retry_transient<T, F, Fut>(mut attempt: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (DomainError, bool)>>,
{
    let mut delay = Duration::from_millis(500);
    let max_attempts = 3;
    let mut last_err = DomainError::ProviderFailure("no attempt made".into());

    for attempt_no in 1..=max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err((err, transient)) if transient && attempt_no < max_attempts => {
                warn!(attempt = attempt_no, error = %err, "transient provider failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_err = err;
            }
            Err((err, _)) => return Err(err),
        }
    }
    Err(last_err)
}
