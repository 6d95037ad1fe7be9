//! QR code entity
//!
//! `short_code` is the redirect lookup key; `original_data` holds the real
//! destination (URL, address, number... depending on `qr_type`).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "qr_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub qr_name: String,
    pub qr_type: String,
    #[sea_orm(column_type = "Text")]
    pub original_data: String,
    #[sea_orm(unique)]
    pub short_code: String,
    pub is_dynamic: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTimeUtc>,
    pub scan_limit: Option<i64>,
    pub scan_count: i64,
    pub foreground_color: String,
    pub background_color: String,
    pub gradient: Option<String>,
    pub eye_shape: String,
    pub module_style: String,
    /// Logo image as a data URI, embedded into the rendered SVG
    #[sea_orm(column_type = "Text", nullable)]
    pub logo_data: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
