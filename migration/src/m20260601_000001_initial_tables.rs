use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::Name).string().null())
                    .col(ColumnDef::new(Users::PasswordHash).string().null())
                    .col(
                        ColumnDef::new(Users::Provider)
                            .string_len(16)
                            .not_null()
                            .default("email"),
                    )
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(16)
                            .not_null()
                            .default("user"),
                    )
                    .col(
                        ColumnDef::new(Users::Plan)
                            .string_len(16)
                            .not_null()
                            .default("free"),
                    )
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
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
                    .name("idx_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(QrCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QrCodes::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QrCodes::UserId).string_len(36).not_null())
                    .col(ColumnDef::new(QrCodes::QrName).string().not_null())
                    .col(ColumnDef::new(QrCodes::QrType).string_len(16).not_null())
                    .col(ColumnDef::new(QrCodes::OriginalData).text().not_null())
                    .col(ColumnDef::new(QrCodes::ShortCode).string_len(32).not_null())
                    .col(
                        ColumnDef::new(QrCodes::IsDynamic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(QrCodes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(QrCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(QrCodes::ScanLimit).big_integer().null())
                    .col(
                        ColumnDef::new(QrCodes::ScanCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QrCodes::ForegroundColor)
                            .string_len(32)
                            .not_null()
                            .default("#000000"),
                    )
                    .col(
                        ColumnDef::new(QrCodes::BackgroundColor)
                            .string_len(32)
                            .not_null()
                            .default("#ffffff"),
                    )
                    .col(ColumnDef::new(QrCodes::Gradient).string_len(64).null())
                    .col(
                        ColumnDef::new(QrCodes::EyeShape)
                            .string_len(16)
                            .not_null()
                            .default("square"),
                    )
                    .col(
                        ColumnDef::new(QrCodes::ModuleStyle)
                            .string_len(16)
                            .not_null()
                            .default("square"),
                    )
                    .col(ColumnDef::new(QrCodes::LogoData).text().null())
                    .col(
                        ColumnDef::new(QrCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QrCodes::UpdatedAt)
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
                    .name("idx_qr_codes_short_code")
                    .table(QrCodes::Table)
                    .col(QrCodes::ShortCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_qr_codes_user_id")
                    .table(QrCodes::Table)
                    .col(QrCodes::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_qr_codes_created_at")
                    .table(QrCodes::Table)
                    .col(QrCodes::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_qr_codes_created_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_qr_codes_user_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_qr_codes_short_code").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QrCodes::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_users_email").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Email,
    Name,
    PasswordHash,
    Provider,
    Role,
    Plan,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum QrCodes {
    #[sea_orm(iden = "qr_codes")]
    Table,
    Id,
    UserId,
    QrName,
    QrType,
    OriginalData,
    ShortCode,
    IsDynamic,
    IsActive,
    ExpiresAt,
    ScanLimit,
    ScanCount,
    ForegroundColor,
    BackgroundColor,
    Gradient,
    EyeShape,
    ModuleStyle,
    LogoData,
    CreatedAt,
    UpdatedAt,
}
