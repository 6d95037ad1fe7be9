//! UserAgent lookup table entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "user_agents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub hash: String, // CHAR(16) xxHash64 hex
    #[sea_orm(column_type = "Text")]
    pub user_agent_string: String,
    pub browser_name: Option<String>,
    pub os_name: Option<String>,
    pub device_category: Option<String>,
    #[sea_orm(default_value = false)]
    pub is_bot: bool,
    pub first_seen: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
