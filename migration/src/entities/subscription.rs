//! Subscription entity
//!
//! One row per checkout attempt; webhook processing flips `status` from
//! pending to active/failed and stamps the provider payment id.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub plan: String,
    /// Amount in the currency's main unit (rupees, not paise)
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub status: String,
    pub start_date: DateTimeUtc,
    pub end_date: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
