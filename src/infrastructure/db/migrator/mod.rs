//! Database migrations — one table per migration, applied in order.
//!
//! Runs against sqlite in dev/tests and Postgres in production via
//! `DATABASE_URL` (spec.md §1: the relational store itself is out of scope,
//! the schema that the Data-Access Gateway reads through is in scope).

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_clients;
mod m20240101_000002_create_stations;
mod m20240101_000003_create_connectors;
mod m20240101_000004_create_tariff_rules;
mod m20240101_000005_create_charging_sessions;
mod m20240101_000006_create_meter_samples;
mod m20240101_000007_create_top_ups;
mod m20240101_000008_create_idempotency_keys;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_clients::Migration),
            Box::new(m20240101_000002_create_stations::Migration),
            Box::new(m20240101_000003_create_connectors::Migration),
            Box::new(m20240101_000004_create_tariff_rules::Migration),
            Box::new(m20240101_000005_create_charging_sessions::Migration),
            Box::new(m20240101_000006_create_meter_samples::Migration),
            Box::new(m20240101_000007_create_top_ups::Migration),
            Box::new(m20240101_000008_create_idempotency_keys::Migration),
        ]
    }
}
