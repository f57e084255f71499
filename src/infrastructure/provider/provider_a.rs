//! `provider-a` adapter: HMAC-SHA256 over the raw body, hex-encoded, sent as
//! `X-Provider-Signature`.

use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::ProviderConfig;
use crate::shared::errors::{DomainError, DomainResult};

use super::{retry_transient, InvoiceCreated, PaymentProvider, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct CreateInvoiceRequest<'a> {
    client_id: &'a str,
    amount_minor: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct CreateInvoiceResponse {
    order_id: String,
    qr_payload: String,
    expires_in_secs: i64,
}

#[derive(Deserialize)]
struct WebhookBody {
    order_id: String,
    status: String,
    paid_amount_minor: i64,
}

pub struct ProviderA {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderA {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn mac(&self) -> DomainResult<HmacSha256> {
        HmacSha256::new_from_slice(self.config.provider_secret.as_bytes())
            .map_err(|e| DomainError::Internal(format!("hmac key init: {e}")))
    }
}

#[async_trait::async_trait]
impl PaymentProvider for ProviderA {
    async fn create_invoice(
        &self,
        client_id: &str,
        amount: i64,
        currency: &str,
    ) -> DomainResult<InvoiceCreated> {
        let url = format!("{}/v1/invoices", self.config.provider_base_url);
        retry_transient(|| async {
            let resp = self
                .http
                .post(&url)
                .json(&CreateInvoiceRequest {
                    client_id,
                    amount_minor: amount,
                    currency,
                })
                .send()
                .await
                .map_err(|e| (DomainError::ProviderFailure(e.to_string()), true))?;

            if resp.status().is_server_error() {
                return Err((
                    DomainError::ProviderFailure(format!("provider-a {}", resp.status())),
                    true,
                ));
            }
            if !resp.status().is_success() {
                return Err((
                    DomainError::ProviderFailure(format!("provider-a {}", resp.status())),
                    false,
                ));
            }

            let body: CreateInvoiceResponse = resp
                .json()
                .await
                .map_err(|e| (DomainError::ProviderFailure(format!("decode: {e}")), false))?;

            Ok(InvoiceCreated {
                provider_order_id: body.order_id,
                qr_payload: body.qr_payload,
                expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in_secs),
            })
        })
        .await
    }

    fn verify_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        let Ok(expected) = hex::decode(signature_header.trim()) else {
            return false;
        };
        mac.update(raw_body);
        mac.verify_slice(&expected).is_ok()
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> DomainResult<WebhookPayload> {
        let body: WebhookBody = serde_json::from_slice(raw_body)
            .map_err(|e| DomainError::InvalidArgument(format!("webhook decode: {e}")))?;
        Ok(WebhookPayload {
            provider_order_id: body.order_id,
            status: body.status,
            paid_amount: body.paid_amount_minor,
        })
    }

    fn ack_body(&self) -> &'static str {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderA {
        ProviderA::new(ProviderConfig {
            provider_kind: crate::config::ProviderKind::ProviderA,
            provider_secret: "test-secret".to_owned(),
            provider_base_url: "https://provider-a.example".to_owned(),
        })
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let provider = provider();
        let body = br#"{"order_id":"o1","status":"approved","paid_amount_minor":500}"#;
        let signature = sign("test-secret", body);
        assert!(provider.verify_signature(body, &signature));
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let provider = provider();
        let body = br#"{"order_id":"o1","status":"approved","paid_amount_minor":500}"#;
        let signature = sign("wrong-secret", body);
        assert!(!provider.verify_signature(body, &signature));
    }

    #[test]
    fn verify_signature_rejects_malformed_header() {
        let provider = provider();
        assert!(!provider.verify_signature(b"{}", "not-hex"));
    }

    #[test]
    fn parse_webhook_maps_fields() {
        let provider = provider();
        let body = br#"{"order_id":"o1","status":"approved","paid_amount_minor":500}"#;
        let payload = provider.parse_webhook(body).unwrap();
        assert_eq!(payload.provider_order_id, "o1");
        assert!(payload.is_approved());
        assert_eq!(payload.paid_amount, 500);
    }
}
