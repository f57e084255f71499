//! `/balance/topup` handler (spec.md §4.8).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::dto::{TopUpRequest, TopUpResponse};
use crate::api::error::ApiError;
use crate::api::handlers::charging::{client_id_of, idempotency_key_of};
use crate::api::idempotency::with_idempotency;
use crate::api::state::AppState;

/// The same `Idempotency-Key` header drives both the generic response-replay
/// cache (`with_idempotency`) and `TopUpService`'s own
/// `(client_id, idempotency_key)` 24h invoice lookup (spec.md §3, §4.8) —
/// they're complementary, not redundant: the former replays the exact HTTP
/// response, the latter stops a second provider invoice from being created
/// if the response cache was itself evicted or never written.
pub async fn topup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let client_id = client_id_of(&headers)?;
    let key = idempotency_key_of(&headers);
    let topups = state.topups.clone();
    let (status, body) = with_idempotency(&state, "POST /balance/topup", key.as_deref(), move || async move {
        let result = topups.create_topup(&client_id, req.amount, key.as_deref()).await?;
        Ok((StatusCode::OK, TopUpResponse::from(result)))
    })
    .await?;
    Ok((status, Json(body)))
}
