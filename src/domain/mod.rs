//! Core business entities (spec.md §3), transport- and storage-agnostic.
//!
//! These are plain structs/enums; persistence mapping lives in
//! `infrastructure::db::entities`, REST mapping in `interfaces::http::dto`.

pub mod charging_session;
pub mod client;
pub mod connector;
pub mod invoice;
pub mod meter_sample;
pub mod repositories;
pub mod station;
pub mod tariff;

pub use charging_session::{ChargingSession, LimitKind, SessionStatus};
pub use client::Client;
pub use connector::{Connector, ConnectorStatus};
pub use invoice::{Invoice, InvoiceStatus};
pub use meter_sample::OcppMeterSample;
pub use repositories::RepositoryProvider;
pub use station::{Station, StationStatus};
pub use tariff::TariffRule;
