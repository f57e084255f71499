//! Data-Access Gateway infrastructure: SeaORM entities, migrations, and the
//! repository implementations behind `domain::repositories` (spec.md §2,
//! 10% share; SPEC_FULL.md §3.1).

pub mod entities;
pub mod migrator;
pub mod repositories;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::shared::errors::DomainError;

/// Opens the connection pool and applies any pending migrations.
///
/// `database_url` follows SeaORM's scheme (`sqlite://...?mode=rwc`,
/// `postgres://...`); the relational store itself is out of scope per
/// spec.md §1, this is the bootstrap for the typed interface over it.
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DomainError> {
    info!(database_url, "connecting to database");
    let mut opts = ConnectOptions::new(database_url.to_owned());
    opts.sqlx_logging(false);
    let db = Database::connect(opts)
        .await
        .map_err(|e| DomainError::Internal(format!("database connect failed: {e}")))?;

    migrator::Migrator::up(&db, None)
        .await
        .map_err(|e| DomainError::Internal(format!("migration failed: {e}")))?;

    info!("database ready");
    Ok(db)
}
