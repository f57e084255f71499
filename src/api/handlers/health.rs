//! `GET /health` (SPEC_FULL.md §2 ambient stack; grounded on the teacher's
//! `interfaces/http/modules/health/handlers.rs`).

use axum::extract::State;
use axum::Json;
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: ComponentHealth,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.db.get_database_backend();
    let database = match state.db.execute(Statement::from_string(backend, "SELECT 1")).await {
        Ok(_) => ComponentHealth { status: "ok" },
        Err(_) => ComponentHealth { status: "unreachable" },
    };
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION"), database })
}
