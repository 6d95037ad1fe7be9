//! Scan log entity for detailed scan tracking

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "scan_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub qr_code_id: String,
    pub scanned_at: DateTimeUtc,
    pub ip_address: Option<String>,
    /// UserAgent hash (references user_agents.hash)
    pub user_agent_hash: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
