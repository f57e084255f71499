//! SeaORM entities — one module per persisted table (spec.md §6 Persisted
//! layout, SPEC_FULL.md §4).

pub mod charging_session;
pub mod client;
pub mod connector;
pub mod idempotency_key;
pub mod meter_sample;
pub mod station;
pub mod tariff_rule;
pub mod top_up;

pub use charging_session::Entity as ChargingSession;
pub use client::Entity as Client;
pub use connector::Entity as Connector;
pub use idempotency_key::Entity as IdempotencyKey;
pub use meter_sample::Entity as MeterSample;
pub use station::Entity as Station;
pub use tariff_rule::Entity as TariffRule;
pub use top_up::Entity as TopUp;
