//! Subscription queries and mutations
//!
//! 每次下单插入一行 pending 记录；webhook 按 provider_order_id 定位并
//! 翻转状态。

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::info;

use super::SeaOrmStorage;
use super::converters::{model_to_subscription, subscription_to_active_model};
use crate::errors::{QrifyError, Result};
use crate::storage::models::Subscription;

use migration::entities::subscription;

impl SeaOrmStorage {
    pub async fn insert_subscription(&self, s: &Subscription) -> Result<()> {
        let active = subscription_to_active_model(s, true);
        subscription::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("插入订阅记录失败: {}", e)))?;

        info!(
            "Subscription created: {} (user={}, plan={}, status={})",
            s.id, s.user_id, s.plan, s.status
        );
        Ok(())
    }

    pub async fn update_subscription(&self, s: &Subscription) -> Result<()> {
        let active = subscription_to_active_model(s, false);
        subscription::Entity::update(active)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("更新订阅记录失败: {}", e)))?;
        Ok(())
    }

    /// webhook 回调按 provider 订单号定位 pending 行
    pub async fn get_subscription_by_order_id(
        &self,
        order_id: &str,
    ) -> Result<Option<Subscription>> {
        let model = subscription::Entity::find()
            .filter(subscription::Column::ProviderOrderId.eq(order_id))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_subscription))
    }

    /// 用户的订阅历史，最新在前
    pub async fn list_subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let models = subscription::Entity::find()
            .filter(subscription::Column::UserId.eq(user_id))
            .order_by_desc(subscription::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_subscription).collect())
    }
}
