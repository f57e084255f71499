//! REST Surface routing (spec.md §4.8; SPEC_FULL.md §3.10). Grounded on the
//! teacher's `interfaces/http/router.rs` layering (CORS + trace layers over
//! a flat `Router::new().route(...)` chain), simplified to this crate's
//! single `AppState`.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{balance, charging, health, metrics, webhook};
use crate::api::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/charging/start", post(charging::start_charge))
        .route("/charging/stop", post(charging::stop_charge))
        .route("/charging/{session_id}", get(charging::get_session))
        .route("/balance/topup", post(balance::topup))
        .route("/payment/webhook", post(webhook::payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
