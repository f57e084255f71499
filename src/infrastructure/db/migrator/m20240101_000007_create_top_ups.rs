//! Create `top_ups` table — Invoice / Top-Up (spec.md §3, §4.7).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TopUps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TopUps::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(TopUps::ClientId).string().not_null())
                    .col(ColumnDef::new(TopUps::ProviderOrderId).string().not_null())
                    .col(ColumnDef::new(TopUps::AmountRequested).big_integer().not_null())
                    .col(ColumnDef::new(TopUps::AmountPaid).big_integer())
                    .col(
                        ColumnDef::new(TopUps::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(TopUps::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TopUps::IdempotencyKey).string())
                    .col(
                        ColumnDef::new(TopUps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TopUps::PaidAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_top_ups_provider_order")
                    .table(TopUps::Table)
                    .col(TopUps::ProviderOrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_top_ups_client_idempotency")
                    .table(TopUps::Table)
                    .col(TopUps::ClientId)
                    .col(TopUps::IdempotencyKey)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TopUps::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum TopUps {
    Table,
    Id,
    ClientId,
    ProviderOrderId,
    AmountRequested,
    AmountPaid,
    Status,
    ExpiresAt,
    IdempotencyKey,
    CreatedAt,
    PaidAt,
}
