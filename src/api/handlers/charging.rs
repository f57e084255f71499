//! `/charging/*` handlers (spec.md §4.8).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::dto::{ChargingSessionDto, StartChargeRequest, StartChargeResponse, StopChargeRequest};
use crate::api::error::ApiError;
use crate::api::idempotency::with_idempotency;
use crate::api::state::AppState;
use crate::shared::errors::DomainError;

pub(crate) fn client_id_of(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::from(DomainError::Unauthenticated))
}

pub(crate) fn idempotency_key_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

pub async fn start_charge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StartChargeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let client_id = client_id_of(&headers)?;
    let key = idempotency_key_of(&headers);
    let lifecycle = state.lifecycle.clone();
    let (status, body) = with_idempotency(&state, "POST /charging/start", key.as_deref(), move || async move {
        let (limit_kind, limit_value) = req.resolve_limit()?;
        let session_id = lifecycle
            .start_charge(&client_id, &req.station_id, req.connector_id, limit_kind, limit_value)
            .await?;
        Ok((StatusCode::OK, StartChargeResponse { session_id }))
    })
    .await?;
    Ok((status, Json(body)))
}

pub async fn stop_charge(
    State(state): State<AppState>,
    Json(req): Json<StopChargeRequest>,
) -> Result<Json<ChargingSessionDto>, ApiError> {
    let session = state.lifecycle.stop_charge(&req.session_id).await?;
    Ok(Json(session.into()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ChargingSessionDto>, ApiError> {
    let session = state
        .repos
        .charging_sessions()
        .find_by_id(&session_id)
        .await?
        .ok_or_else(|| ApiError::from(DomainError::NotFound { entity: "charging_session", id: session_id.clone() }))?;
    Ok(Json(session.into()))
}
