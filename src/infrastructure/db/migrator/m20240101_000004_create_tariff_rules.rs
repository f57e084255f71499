//! Create `tariff_rules` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TariffRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TariffRules::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TariffRules::StationId).string())
                    .col(ColumnDef::new(TariffRules::PricePerKwh).string().not_null())
                    .col(ColumnDef::new(TariffRules::ValidFrom).timestamp_with_time_zone())
                    .col(ColumnDef::new(TariffRules::ValidTo).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TariffRules::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum TariffRules {
    Table,
    Id,
    StationId,
    PricePerKwh,
    ValidFrom,
    ValidTo,
}
