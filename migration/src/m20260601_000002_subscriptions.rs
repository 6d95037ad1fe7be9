use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UserId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Subscriptions::Plan).string_len(16).not_null())
                    .col(ColumnDef::new(Subscriptions::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Subscriptions::Currency)
                            .string_len(8)
                            .not_null()
                            .default("INR"),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Provider)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::ProviderOrderId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::ProviderPaymentId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::StartDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::EndDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_user_id")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::UserId)
                    .to_owned(),
            )
            .await?;

        // Webhook processing resolves pending rows by order id
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_order_id")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::ProviderOrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_subscriptions_order_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_subscriptions_user_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Subscriptions {
    #[sea_orm(iden = "subscriptions")]
    Table,
    Id,
    UserId,
    Plan,
    Amount,
    Currency,
    Provider,
    ProviderOrderId,
    ProviderPaymentId,
    Status,
    StartDate,
    EndDate,
    CreatedAt,
}
