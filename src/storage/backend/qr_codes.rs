//! QR code queries and mutations
//!
//! 点查（短码）、分页列表、增删改、以及短码唯一性探测。

use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{debug, error, info};

use super::converters::{model_to_qr_code, qr_code_to_active_model};
use super::{QrFilter, SeaOrmStorage, retry};
use crate::errors::{QrifyError, Result};
use crate::storage::models::QrCode;

use migration::entities::{qr_code, scan_log};

impl SeaOrmStorage {
    /// 按短码点查（redirect 热路径，带重试）
    pub async fn get_qr_by_code(&self, code: &str) -> Option<QrCode> {
        let db = &self.db;
        let code_owned = code.to_string();

        let result = retry::with_retry(
            &format!("get_qr_by_code({})", code),
            self.retry_config,
            || async {
                qr_code::Entity::find()
                    .filter(qr_code::Column::ShortCode.eq(&code_owned))
                    .one(db)
                    .await
            },
        )
        .await;

        match result {
            Ok(Some(model)) => Some(model_to_qr_code(model)),
            Ok(None) => None,
            Err(e) => {
                error!("查询 QR 码失败（重试后仍失败）: {}", e);
                None
            }
        }
    }

    /// 按主键点查
    pub async fn get_qr_by_id(&self, id: &str) -> Result<Option<QrCode>> {
        let model = qr_code::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(model_to_qr_code))
    }

    /// 只加载所有短码（用于 Bloom Filter 初始化，内存占用小）
    pub async fn load_all_codes(&self) -> Vec<String> {
        match qr_code::Entity::find()
            .select_only()
            .column(qr_code::Column::ShortCode)
            .into_tuple::<String>()
            .all(&self.db)
            .await
        {
            Ok(codes) => {
                info!("Loaded {} short codes for Bloom filter", codes.len());
                codes
            }
            Err(e) => {
                error!("加载短码列表失败: {}", e);
                Vec::new()
            }
        }
    }

    /// 检查短码是否已被占用（创建时的唯一性探测）
    pub async fn short_code_exists(&self, code: &str) -> Result<bool> {
        let count = qr_code::Entity::find()
            .filter(qr_code::Column::ShortCode.eq(code))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// 全表计数（健康检查用，COUNT 即数据库连通性探测）
    pub async fn count_qrs(&self) -> Result<u64> {
        qr_code::Entity::find()
            .count(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 统计用户名下 active 的 QR 码数量（套餐额度检查）
    pub async fn count_active_qrs(&self, user_id: &str) -> Result<u64> {
        qr_code::Entity::find()
            .filter(qr_code::Column::UserId.eq(user_id))
            .filter(qr_code::Column::IsActive.eq(true))
            .count(&self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn insert_qr(&self, qr: &QrCode) -> Result<()> {
        let active = qr_code_to_active_model(qr, true);
        qr_code::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("插入 QR 码失败: {}", e)))?;

        self.invalidate_count_cache();
        info!("QR code created: {} ({})", qr.short_code, qr.id);
        Ok(())
    }

    pub async fn update_qr(&self, qr: &QrCode) -> Result<()> {
        let active = qr_code_to_active_model(qr, false);
        qr_code::Entity::update(active)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("更新 QR 码失败: {}", e)))?;

        Ok(())
    }

    /// 删除 QR 码及其扫描日志（先日志后主体）
    pub async fn delete_qr(&self, id: &str) -> Result<()> {
        scan_log::Entity::delete_many()
            .filter(scan_log::Column::QrCodeId.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("删除扫描日志失败: {}", e)))?;

        let result = qr_code::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("删除 QR 码失败: {}", e)))?;

        if result.rows_affected == 0 {
            return Err(QrifyError::not_found(format!("QR 码不存在: {}", id)));
        }

        self.invalidate_count_cache();
        info!("QR code deleted: {}", id);
        Ok(())
    }

    /// 用户名下所有 QR 码 id（级联删除 / 数据导出）
    pub async fn list_qr_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        qr_code::Entity::find()
            .select_only()
            .column(qr_code::Column::Id)
            .filter(qr_code::Column::UserId.eq(user_id))
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 带过滤条件的分页列表（带 COUNT 缓存）
    pub async fn list_qrs_paginated(
        &self,
        page: u64,
        page_size: u64,
        filter: QrFilter,
    ) -> (Vec<QrCode>, u64) {
        // 生成缓存 key（基于过滤条件）
        let cache_key = format!(
            "qr_count:s={:?}:u={:?}:a={}:t={:?}",
            filter.search, filter.user_id, filter.only_active, filter.qr_type
        );

        let condition = build_qr_condition(&filter);

        // 尝试从缓存获取总数
        let total = if let Some(cached) = self.count_cache.get(&cache_key) {
            debug!("count cache hit: key={}, value={}", cache_key, cached);
            cached
        } else {
            // 缓存未命中，执行 COUNT 查询（带重试）
            let db = &self.db;
            let cond = condition.clone();
            let count_result =
                retry::with_retry("list_qrs_paginated(count)", self.retry_config, || async {
                    qr_code::Entity::find().filter(cond.clone()).count(db).await
                })
                .await;

            let count = count_result.unwrap_or(0);
            self.count_cache.insert(cache_key, count);
            count
        };

        // 执行分页数据查询（带重试）
        let db = &self.db;
        let page_offset = page.saturating_sub(1);
        let models_result =
            retry::with_retry("list_qrs_paginated(data)", self.retry_config, || async {
                qr_code::Entity::find()
                    .filter(condition.clone())
                    .order_by_desc(qr_code::Column::CreatedAt)
                    .paginate(db, page_size)
                    .fetch_page(page_offset)
                    .await
            })
            .await;

        let models = match models_result {
            Ok(models) => models,
            Err(e) => {
                error!("分页查询失败（重试后仍失败）: {}", e);
                return (Vec::new(), total);
            }
        };

        let qrs: Vec<QrCode> = models.into_iter().map(model_to_qr_code).collect();
        (qrs, total)
    }

    /// 带过滤条件加载所有 QR 码（不分页，用于导出）
    pub async fn load_qrs_filtered(&self, filter: QrFilter) -> Vec<QrCode> {
        let condition = build_qr_condition(&filter);

        match qr_code::Entity::find()
            .filter(condition)
            .order_by_desc(qr_code::Column::CreatedAt)
            .all(&self.db)
            .await
        {
            Ok(models) => models.into_iter().map(model_to_qr_code).collect(),
            Err(e) => {
                error!("加载过滤 QR 码失败: {}", e);
                Vec::new()
            }
        }
    }

    /// 清理无效记录：短码或目标数据为空的行（admin purge）
    pub async fn purge_invalid_qrs(&self) -> Result<u64> {
        let result = qr_code::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(qr_code::Column::ShortCode.eq(""))
                    .add(qr_code::Column::OriginalData.eq("")),
            )
            .exec(&self.db)
            .await
            .map_err(|e| QrifyError::database_operation(format!("清理无效 QR 码失败: {}", e)))?;

        if result.rows_affected > 0 {
            self.invalidate_count_cache();
            info!("Purged {} invalid QR codes", result.rows_affected);
        }
        Ok(result.rows_affected)
    }
}

/// 构建列表查询条件（分页与导出共用）
fn build_qr_condition(filter: &QrFilter) -> Condition {
    let mut condition = Condition::all();

    // search: 模糊匹配 name、short_code 或 original_data
    if let Some(ref search) = filter.search {
        condition = condition.add(
            Condition::any()
                .add(qr_code::Column::QrName.contains(search))
                .add(qr_code::Column::ShortCode.contains(search))
                .add(qr_code::Column::OriginalData.contains(search)),
        );
    }

    if let Some(ref user_id) = filter.user_id {
        condition = condition.add(qr_code::Column::UserId.eq(user_id));
    }

    if filter.only_active {
        condition = condition.add(qr_code::Column::IsActive.eq(true));
    }

    if let Some(ref qr_type) = filter.qr_type {
        condition = condition.add(qr_code::Column::QrType.eq(qr_type));
    }

    condition
}
