//! Create `connectors` table — `(station_id, connector_id)` composite key.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connectors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Connectors::StationId).string().not_null())
                    .col(ColumnDef::new(Connectors::ConnectorId).integer().not_null())
                    .col(
                        ColumnDef::new(Connectors::Status)
                            .string()
                            .not_null()
                            .default("available"),
                    )
                    .primary_key(
                        Index::create()
                            .col(Connectors::StationId)
                            .col(Connectors::ConnectorId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Connectors::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Connectors {
    Table,
    StationId,
    ConnectorId,
    Status,
}
