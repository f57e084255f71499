//! Shared Axum state for the REST Surface (spec.md §4.8; SPEC_FULL.md §3.10).

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;

use crate::charging::{ChargingLifecycleEngine, TopUpService};
use crate::domain::RepositoryProvider;

#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub lifecycle: Arc<ChargingLifecycleEngine>,
    pub topups: Arc<TopUpService>,
    pub db: DatabaseConnection,
    pub prometheus: PrometheusHandle,
}
