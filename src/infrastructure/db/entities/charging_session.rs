//! `charging_sessions` table entity — the central aggregate (spec.md §3).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "charging_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub client_id: String,
    pub station_id: String,
    pub connector_id: i32,

    /// "energy" | "amount"
    pub limit_kind: String,
    /// Decimal string (kWh for energy, minor-unit amount for amount).
    pub limit_value: String,
    pub reserved_amount: i64,

    pub id_tag: String,

    #[sea_orm(nullable)]
    pub ocpp_tx_id: Option<i64>,
    #[sea_orm(nullable)]
    pub meter_start: Option<i64>,
    #[sea_orm(nullable)]
    pub meter_stop: Option<i64>,
    #[sea_orm(nullable)]
    pub energy_delivered_wh: Option<i64>,
    #[sea_orm(nullable)]
    pub amount_charged: Option<i64>,
    #[sea_orm(nullable)]
    pub refund_amount: Option<i64>,

    /// pending | starting | active | stopping | stopped | failed | expired
    pub status: String,

    pub created_at: DateTimeUtc,
    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub stopped_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::meter_sample::Entity")]
    MeterSample,
}

impl Related<super::meter_sample::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MeterSample.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
