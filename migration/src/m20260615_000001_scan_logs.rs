use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScanLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScanLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScanLogs::QrCodeId).string_len(36).not_null())
                    .col(
                        ColumnDef::new(ScanLogs::ScannedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScanLogs::IpAddress).string_len(64).null())
                    .col(ColumnDef::new(ScanLogs::DeviceType).string_len(32).null())
                    .col(ColumnDef::new(ScanLogs::Os).string_len(64).null())
                    .col(ColumnDef::new(ScanLogs::Browser).string_len(64).null())
                    .col(ColumnDef::new(ScanLogs::Country).string_len(64).null())
                    .col(ColumnDef::new(ScanLogs::City).string_len(128).null())
                    .col(ColumnDef::new(ScanLogs::Referrer).text().null())
                    .to_owned(),
            )
            .await?;

        // Stats queries scan by code + time window
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scan_logs_qr_scanned")
                    .table(ScanLogs::Table)
                    .col(ScanLogs::QrCodeId)
                    .col((ScanLogs::ScannedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        // Unique-visitor counting groups by IP within a code
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scan_logs_qr_ip")
                    .table(ScanLogs::Table)
                    .col(ScanLogs::QrCodeId)
                    .col(ScanLogs::IpAddress)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_scan_logs_qr_ip").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_scan_logs_qr_scanned").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScanLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScanLogs {
    #[sea_orm(iden = "scan_logs")]
    Table,
    Id,
    QrCodeId,
    ScannedAt,
    IpAddress,
    DeviceType,
    Os,
    Browser,
    Country,
    City,
    Referrer,
}
