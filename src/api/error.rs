//! REST error translation (spec.md §6, §7) — the only place a `DomainError`
//! becomes an HTTP response, `{code, message, details?}` per spec.md §6.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::shared::errors::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody { code, message: message.into(), details: None },
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        let (status, code) = match &e {
            DomainError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "InvalidArgument"),
            DomainError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
            DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
            DomainError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            DomainError::ClientBusy => (StatusCode::CONFLICT, "ClientBusy"),
            DomainError::ConnectorBusy => (StatusCode::CONFLICT, "ConnectorBusy"),
            DomainError::InsufficientFunds => (StatusCode::CONFLICT, "InsufficientFunds"),
            DomainError::StationUnavailable(_) => (StatusCode::CONFLICT, "StationUnavailable"),
            DomainError::ProviderFailure(_) => (StatusCode::BAD_GATEWAY, "ProviderFailure"),
            DomainError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            DomainError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
