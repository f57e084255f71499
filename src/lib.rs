//! EV charging station control plane: OCPP 1.6-JSON session layer,
//! charging-session lifecycle engine, command router, background
//! reconciler, and REST API (see SPEC_FULL.md).

pub mod api;
pub mod charging;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ocpp;
pub mod shared;

pub use config::{default_config_path, AppConfig};
pub use infrastructure::db::repositories::repository_provider::SeaOrmRepositoryProvider;
