//! Create `stations` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Stations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Stations::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Stations::LocationId).string())
                    .col(ColumnDef::new(Stations::OwnerId).string())
                    .col(
                        ColumnDef::new(Stations::Status)
                            .string()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(Stations::LastHeartbeatAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Stations::BootInfo).text())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Stations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Stations {
    Table,
    Id,
    LocationId,
    OwnerId,
    Status,
    LastHeartbeatAt,
    BootInfo,
}
