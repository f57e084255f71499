//! `POST /payment/webhook` (spec.md §4.7, §6). Raw body + signature header in,
//! provider's literal ack string out — the body is never a JSON extractor
//! since the signature is computed over the exact bytes on the wire.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::shared::errors::DomainError;

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, String), ApiError> {
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::from(DomainError::Unauthenticated))?;
    let ack = state.topups.handle_webhook(&body, signature).await?;
    Ok((StatusCode::OK, ack.to_owned()))
}
