//! `GET /metrics` — Prometheus scrape endpoint (SPEC_FULL.md §2 ambient
//! stack; grounded on the teacher's
//! `interfaces/http/modules/metrics/handlers.rs`).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::api::state::AppState;

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.prometheus.render();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4; charset=utf-8")], body)
}
