//! `provider-b` adapter: same HMAC-SHA256 scheme, different wire shape and
//! header name (`X-Provider-B-Hmac`), matching a provider that encodes
//! amounts as decimal strings rather than minor-unit integers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;

use crate::config::ProviderConfig;
use crate::shared::errors::{DomainError, DomainResult};

use super::{retry_transient, InvoiceCreated, PaymentProvider, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    merchant_ref: &'a str,
    amount: String,
    currency: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    qr: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WebhookBody {
    id: String,
    state: String,
    amount: String,
}

pub struct ProviderB {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderB {
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
impl PaymentProvider for ProviderB {
    async fn create_invoice(
        &self,
        client_id: &str,
        amount: i64,
        currency: &str,
    ) -> DomainResult<InvoiceCreated> {
        let url = format!("{}/orders", self.config.provider_base_url);
        let amount_decimal = Decimal::new(amount, 2).to_string();
        retry_transient(|| async {
            let resp = self
                .http
                .post(&url)
                .json(&CreateOrderRequest {
                    merchant_ref: client_id,
                    amount: amount_decimal.clone(),
                    currency,
                })
                .send()
                .await
                .map_err(|e| (DomainError::ProviderFailure(e.to_string()), true))?;

            if resp.status().is_server_error() {
                return Err((
                    DomainError::ProviderFailure(format!("provider-b {}", resp.status())),
                    true,
                ));
            }
            if !resp.status().is_success() {
                return Err((
                    DomainError::ProviderFailure(format!("provider-b {}", resp.status())),
                    false,
                ));
            }

            let body: CreateOrderResponse = resp
                .json()
                .await
                .map_err(|e| (DomainError::ProviderFailure(format!("decode: {e}")), false))?;

            Ok(InvoiceCreated {
                provider_order_id: body.id,
                qr_payload: body.qr,
                expires_at: body.expires_at,
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
        let major = Decimal::from_str(&body.amount)
            .map_err(|e| DomainError::InvalidArgument(format!("webhook amount decode: {e}")))?;
        let minor = (major * Decimal::new(100, 0)).round();
        let paid_amount: i64 = minor
            .to_string()
            .parse()
            .map_err(|e| DomainError::Internal(format!("webhook amount overflow: {e}")))?;
        Ok(WebhookPayload {
            provider_order_id: body.id,
            status: body.state,
            paid_amount,
        })
    }

    fn ack_body(&self) -> &'static str {
        "{\"received\":true}"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderB {
        ProviderB::new(ProviderConfig {
            provider_kind: crate::config::ProviderKind::ProviderB,
            provider_secret: "test-secret".to_owned(),
            provider_base_url: "https://provider-b.example".to_owned(),
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
        let body = br#"{"id":"o1","state":"approved","amount":"5.00"}"#;
        let signature = sign("test-secret", body);
        assert!(provider.verify_signature(body, &signature));
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let provider = provider();
        let body = br#"{"id":"o1","state":"approved","amount":"5.00"}"#;
        let signature = sign("wrong-secret", body);
        assert!(!provider.verify_signature(body, &signature));
    }

    #[test]
    fn parse_webhook_converts_decimal_amount_to_minor_units() {
        let provider = provider();
        let body = br#"{"id":"o1","state":"approved","amount":"5.00"}"#;
        let payload = provider.parse_webhook(body).unwrap();
        assert_eq!(payload.provider_order_id, "o1");
        assert!(payload.is_approved());
        assert_eq!(payload.paid_amount, 500);
    }

    #[test]
    fn parse_webhook_rounds_fractional_minor_units() {
        let provider = provider();
        let body = br#"{"id":"o2","state":"approved","amount":"5.005"}"#;
        let payload = provider.parse_webhook(body).unwrap();
        assert_eq!(payload.paid_amount, 501);
    }

    #[test]
    fn parse_webhook_rejects_non_decimal_amount() {
        let provider = provider();
        let body = br#"{"id":"o1","state":"approved","amount":"not-a-number"}"#;
        assert!(provider.parse_webhook(body).is_err());
    }
}
