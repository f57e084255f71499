//! `Idempotency-Key` header handling (spec.md §4.8 last line) — the first
//! completed response for a write endpoint is cached for 24h and replayed
//! verbatim for the same key. Ambient (not in spec.md's data model),
//! additive per SPEC_FULL.md §4/§3.10.

use std::future::Future;

use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::domain::repositories::{CachedResponse, IdempotencyRepository};

const IDEMPOTENCY_TTL_HOURS: i64 = 24;

/// Runs `op` once per `(route, key)` within the TTL; a repeat call with the
/// same key replays the cached status/body instead of re-executing `op`.
/// `key = None` (no header supplied) always executes.
pub async fn with_idempotency<T, F, Fut>(
    state: &AppState,
    route: &str,
    key: Option<&str>,
    op: F,
) -> Result<(StatusCode, serde_json::Value), ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(StatusCode, T), ApiError>>,
{
    if let Some(key) = key {
        if let Some(CachedResponse { status, body }) = state.repos.idempotency().find(route, key).await? {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            return Ok((status, body));
        }
    }

    let (status, body) = op().await?;
    let body_json = serde_json::to_value(&body)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", format!("response encode: {e}")))?;

    if let Some(key) = key {
        state
            .repos
            .idempotency()
            .store(
                route,
                key,
                CachedResponse { status: status.as_u16(), body: body_json.clone() },
                Utc::now() + ChronoDuration::hours(IDEMPOTENCY_TTL_HOURS),
            )
            .await?;
    }
    Ok((status, body_json))
}
