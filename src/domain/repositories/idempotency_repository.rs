//! IdempotencyRepository — caches the first completed response for a write
//! endpoint's `Idempotency-Key` header for 24h (spec.md §4.8, ambient — not
//! in spec.md's data model, additive per SPEC_FULL.md §4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::errors::DomainResult;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(&self, route: &str, key: &str) -> DomainResult<Option<CachedResponse>>;

    async fn store(
        &self,
        route: &str,
        key: &str,
        response: CachedResponse,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()>;
}
