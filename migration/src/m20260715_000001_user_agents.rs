//! UserAgent dedup table.
//!
//! Raw UA strings repeat heavily across scans, so scan_logs stores a 16-char
//! xxHash64 hex key into this lookup table instead of the full string.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserAgents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserAgents::Hash)
                            .char_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserAgents::UserAgentString)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserAgents::BrowserName).string_len(64).null())
                    .col(ColumnDef::new(UserAgents::OsName).string_len(64).null())
                    .col(
                        ColumnDef::new(UserAgents::DeviceCategory)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserAgents::IsBot)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserAgents::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(ScanLogs::Table)
                    .add_column(
                        ColumnDef::new(ScanLogs::UserAgentHash)
                            .char_len(16)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scan_logs_ua_hash")
                    .table(ScanLogs::Table)
                    .col(ScanLogs::UserAgentHash)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_scan_logs_ua_hash").to_owned())
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(ScanLogs::Table)
                    .drop_column(ScanLogs::UserAgentHash)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UserAgents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserAgents {
    #[sea_orm(iden = "user_agents")]
    Table,
    Hash,
    UserAgentString,
    BrowserName,
    OsName,
    DeviceCategory,
    IsBot,
    FirstSeen,
}

#[derive(DeriveIden)]
enum ScanLogs {
    #[sea_orm(iden = "scan_logs")]
    Table,
    UserAgentHash,
}
