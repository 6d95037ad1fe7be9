//! User account queries and mutations
//!
//! 注册时的 email 唯一性由数据库唯一索引兜底；账户删除级联清理
//! scan_logs -> qr_codes -> subscriptions -> user。

use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{error, info};

use super::converters::{model_to_user, user_to_active_model};
use super::{SeaOrmStorage, UserFilter};
use crate::errors::{QrifyError, Result};
use crate::storage::models::User;

use migration::entities::{qr_code, scan_log, subscription, user};

impl SeaOrmStorage {
    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let model = user::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(model_to_user))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let model = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_user))
    }

    pub async fn insert_user(&self, u: &User) -> Result<()> {
        let active = user_to_active_model(u, true);
        user::Entity::insert(active).exec(&self.db).await.map_err(|e| {
            // 唯一索引冲突 = 邮箱已注册
            let msg = e.to_string().to_lowercase();
            if msg.contains("unique") || msg.contains("duplicate") {
                QrifyError::conflict(format!("邮箱已被注册: {}", u.email))
            } else {
                QrifyError::database_operation(format!("插入用户失败: {}", e))
            }
        })?;

        info!("User registered: {} ({})", u.email, u.id);
        Ok(())
    }

    pub async fn update_user(&self, u: &User) -> Result<()> {
        let active = user_to_active_model(u, false);
        user::Entity::update(active)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("更新用户失败: {}", e)))?;
        Ok(())
    }

    /// 级联删除账户：scan_logs -> qr_codes -> subscriptions -> user
    pub async fn delete_user_cascade(&self, user_id: &str) -> Result<()> {
        let qr_ids = self.list_qr_ids_for_user(user_id).await?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| QrifyError::database_operation(format!("开始事务失败: {}", e)))?;

        if !qr_ids.is_empty() {
            scan_log::Entity::delete_many()
                .filter(scan_log::Column::QrCodeId.is_in(qr_ids.clone()))
                .exec(&txn)
                .await
                .map_err(|e| {
                    QrifyError::database_operation(format!("删除扫描日志失败: {}", e))
                })?;
        }

        qr_code::Entity::delete_many()
            .filter(qr_code::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(|e| QrifyError::database_operation(format!("删除 QR 码失败: {}", e)))?;

        subscription::Entity::delete_many()
            .filter(subscription::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(|e| QrifyError::database_operation(format!("删除订阅记录失败: {}", e)))?;

        let result = user::Entity::delete_by_id(user_id)
            .exec(&txn)
            .await
            .map_err(|e| QrifyError::database_operation(format!("删除用户失败: {}", e)))?;

        if result.rows_affected == 0 {
            // 回滚由 txn drop 完成
            return Err(QrifyError::not_found(format!("用户不存在: {}", user_id)));
        }

        txn.commit()
            .await
            .map_err(|e| QrifyError::database_operation(format!("提交事务失败: {}", e)))?;

        self.invalidate_count_cache();
        info!("User account deleted (cascade): {}", user_id);
        Ok(())
    }

    /// 分页用户列表（admin，带 COUNT 缓存）
    pub async fn list_users_paginated(
        &self,
        page: u64,
        page_size: u64,
        filter: UserFilter,
    ) -> (Vec<User>, u64) {
        let cache_key = format!(
            "user_count:s={:?}:p={:?}:a={}",
            filter.search, filter.plan, filter.only_active
        );

        let mut condition = Condition::all();
        if let Some(ref search) = filter.search {
            condition = condition.add(
                Condition::any()
                    .add(user::Column::Email.contains(search))
                    .add(user::Column::Name.contains(search)),
            );
        }
        if let Some(ref plan) = filter.plan {
            condition = condition.add(user::Column::Plan.eq(plan));
        }
        if filter.only_active {
            condition = condition.add(user::Column::IsActive.eq(true));
        }

        let total = if let Some(cached) = self.count_cache.get(&cache_key) {
            cached
        } else {
            let count = user::Entity::find()
                .filter(condition.clone())
                .count(&self.db)
                .await
                .unwrap_or(0);
            self.count_cache.insert(cache_key, count);
            count
        };

        let page_offset = page.saturating_sub(1);
        let models = match user::Entity::find()
            .filter(condition)
            .order_by_desc(user::Column::CreatedAt)
            .paginate(&self.db, page_size)
            .fetch_page(page_offset)
            .await
        {
            Ok(models) => models,
            Err(e) => {
                error!("用户分页查询失败: {}", e);
                return (Vec::new(), total);
            }
        };

        (models.into_iter().map(model_to_user).collect(), total)
    }

    /// 批量取用户邮箱（admin QR 列表里带 owner email）
    pub async fn get_user_emails(
        &self,
        ids: &[String],
    ) -> Result<std::collections::HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let models = user::Entity::find()
            .filter(user::Column::Id.is_in(ids.iter().cloned()))
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(|m| (m.id, m.email)).collect())
    }
}
