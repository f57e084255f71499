//! `stations` table entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "stations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(nullable)]
    pub location_id: Option<String>,

    #[sea_orm(nullable)]
    pub owner_id: Option<String>,

    /// unknown | available | occupied | faulted | unavailable | offline
    pub status: String,

    #[sea_orm(nullable)]
    pub last_heartbeat_at: Option<DateTimeUtc>,

    /// BootNotification payload, kept verbatim for diagnostics.
    #[sea_orm(nullable, column_type = "Text")]
    pub boot_info: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::connector::Entity")]
    Connector,
}

impl Related<super::connector::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connector.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
