//! SeaORM storage backend
//!
//! This module provides database storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod analytics;
mod connection;
mod converters;
mod qr_codes;
pub mod retry;
mod scan_sink;
mod subscriptions;
mod users;

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::analytics::ScanSink;
use crate::errors::{QrifyError, Result};

pub use analytics::{BreakdownRow, GeoRow, RecentScanRow, TrendRow};
pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{
    model_to_qr_code, model_to_subscription, model_to_user, qr_code_to_active_model,
    subscription_to_active_model, user_to_active_model,
};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(QrifyError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// QR 码列表过滤条件
#[derive(Default, Clone, Debug)]
pub struct QrFilter {
    /// 模糊搜索 name、short_code 或 original_data
    pub search: Option<String>,
    /// 限定所有者（普通用户列表强制设置，admin 列表可为空）
    pub user_id: Option<String>,
    /// 只返回 is_active = true 的记录
    pub only_active: bool,
    /// 限定类型（url/email/...）
    pub qr_type: Option<String>,
}

/// 用户列表过滤条件（admin）
#[derive(Default, Clone, Debug)]
pub struct UserFilter {
    /// 模糊搜索 email 或 name
    pub search: Option<String>,
    /// 限定套餐
    pub plan: Option<String>,
    /// 只返回未停用账户
    pub only_active: bool,
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    /// 分页 COUNT 缓存（TTL 30秒）
    count_cache: Cache<String, u64>,
    /// 重试配置
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(QrifyError::database_config("DATABASE_URL 未设置".to_string()));
        }

        // 读取重试配置
        let config = crate::config::get_config();
        let retry_config = retry::RetryConfig {
            max_retries: config.database.retry_count,
            base_delay_ms: config.database.retry_base_delay_ms,
            max_delay_ms: config.database.retry_max_delay_ms,
        };

        // 根据不同数据库类型配置连接选项
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            count_cache: Cache::builder()
                .time_to_live(Duration::from_secs(30))
                .max_capacity(100)
                .build(),
            retry_config,
        };

        // 运行迁移
        run_migrations(&storage.db).await?;

        warn!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn as_scan_sink(&self) -> Option<Arc<dyn ScanSink>> {
        Some(Arc::new(self.clone()) as Arc<dyn ScanSink>)
    }

    /// 获取数据库连接（UA store、健康检查等需要直接访问数据库的场景）
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 清除分页 COUNT 缓存（数据变更时调用）
    pub fn invalidate_count_cache(&self) {
        self.count_cache.invalidate_all();
    }
}
