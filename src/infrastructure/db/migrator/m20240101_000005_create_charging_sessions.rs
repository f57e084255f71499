//! Create `charging_sessions` table — the central aggregate (spec.md §3).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingSessions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChargingSessions::ClientId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::StationId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::ConnectorId).integer().not_null())
                    .col(ColumnDef::new(ChargingSessions::LimitKind).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::LimitValue).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::ReservedAmount).big_integer().not_null())
                    .col(ColumnDef::new(ChargingSessions::IdTag).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::OcppTxId).big_integer())
                    .col(ColumnDef::new(ChargingSessions::MeterStart).big_integer())
                    .col(ColumnDef::new(ChargingSessions::MeterStop).big_integer())
                    .col(ColumnDef::new(ChargingSessions::EnergyDeliveredWh).big_integer())
                    .col(ColumnDef::new(ChargingSessions::AmountCharged).big_integer())
                    .col(ColumnDef::new(ChargingSessions::RefundAmount).big_integer())
                    .col(
                        ColumnDef::new(ChargingSessions::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargingSessions::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ChargingSessions::StoppedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_id_tag")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::IdTag)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_client_status")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::ClientId)
                    .col(ChargingSessions::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ChargingSessions {
    Table,
    Id,
    ClientId,
    StationId,
    ConnectorId,
    LimitKind,
    LimitValue,
    ReservedAmount,
    IdTag,
    OcppTxId,
    MeterStart,
    MeterStop,
    EnergyDeliveredWh,
    AmountCharged,
    RefundAmount,
    Status,
    CreatedAt,
    StartedAt,
    StoppedAt,
}
