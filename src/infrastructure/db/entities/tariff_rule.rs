//! `tariff_rules` table entity (spec.md §9 Open Questions).
//!
//! `station_id = NULL` marks a fleet-wide default rule. Resolution picks the
//! row for the station (or the NULL fallback) whose validity window
//! contains `now`; see `TariffRepository::effective_price`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tariff_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(nullable)]
    pub station_id: Option<String>,

    /// Decimal string, parsed via `rust_decimal::Decimal::from_str`.
    pub price_per_kwh: String,

    #[sea_orm(nullable)]
    pub valid_from: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub valid_to: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
