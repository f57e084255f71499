//! SeaORM repository implementations, one file per aggregate, bundled by
//! `SeaOrmRepositoryProvider` (spec.md §2; SPEC_FULL.md §3.1).

pub mod charging_session_repository;
pub mod client_repository;
pub mod connector_repository;
pub mod idempotency_repository;
pub mod invoice_repository;
pub mod meter_sample_repository;
pub mod repository_provider;
pub mod station_repository;
pub mod tariff_repository;

pub use repository_provider::SeaOrmRepositoryProvider;
