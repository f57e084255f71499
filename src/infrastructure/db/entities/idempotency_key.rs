//! `idempotency_keys` table entity — ambient, not in spec.md's data model
//! (SPEC_FULL.md §3.10/§4). Caches the first completed response of a write
//! endpoint for 24h, keyed by `(route, key)`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "idempotency_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub route: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    pub status: i32,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
