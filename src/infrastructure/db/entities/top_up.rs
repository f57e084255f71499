//! `top_ups` table entity — Invoice / Top-Up (spec.md §3, §4.7).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "top_ups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub client_id: String,
    pub provider_order_id: String,
    pub amount_requested: i64,

    #[sea_orm(nullable)]
    pub amount_paid: Option<i64>,

    /// pending | approved | expired | failed
    pub status: String,

    pub expires_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub idempotency_key: Option<String>,

    pub created_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub paid_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
