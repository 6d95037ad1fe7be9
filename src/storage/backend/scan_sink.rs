//! ScanSink implementation for SeaOrmStorage
//!
//! This module implements the scan tracking flush functionality.
//!
//! # Security Note
//!
//! This module uses parameterized queries via `DatabaseBackend::build()` for SQL safety.
//! All `short_code` values are additionally validated via `utils::is_valid_short_code()`
//! as defense-in-depth against SQL injection.

use async_trait::async_trait;
use sea_orm::sea_query::{CaseStatement, Expr, Query};
use sea_orm::{ActiveValue::Set, ConnectionTrait, EntityTrait, ExprTrait};
use tracing::debug;

use super::SeaOrmStorage;
use super::retry;
use crate::analytics::{DetailedScanSink, ScanDetail, ScanSink};
use crate::utils::is_valid_short_code;

use migration::entities::{qr_code, scan_log};

#[async_trait]
impl ScanSink for SeaOrmStorage {
    async fn flush_scans(&self, updates: Vec<(String, usize)>) -> anyhow::Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        // 安全校验：确保所有 short_code 格式合法，防止 SQL 注入
        for (code, _) in &updates {
            if !is_valid_short_code(code) {
                return Err(anyhow::anyhow!(
                    "Invalid short_code format detected: '{}' - refusing to execute SQL",
                    code
                ));
            }
        }

        let total_count = updates.len();

        // 构建 CASE WHEN 表达式（跨平台兼容）
        let mut case_stmt = CaseStatement::new();
        let mut codes: Vec<String> = Vec::with_capacity(total_count);

        for (code, count) in &updates {
            case_stmt = case_stmt.case(
                Expr::col(qr_code::Column::ShortCode).eq(Expr::val(code.as_str())),
                Expr::col(qr_code::Column::ScanCount).add(Expr::val(*count as i64)),
            );
            codes.push(code.clone());
        }
        // 不匹配的保持原值
        case_stmt = case_stmt.finally(Expr::col(qr_code::Column::ScanCount));

        // 构建 UPDATE 语句
        let stmt = Query::update()
            .table(qr_code::Entity)
            .value(qr_code::Column::ScanCount, case_stmt)
            .and_where(Expr::col(qr_code::Column::ShortCode).is_in(codes))
            .to_owned();

        // 使用参数化查询执行（SeaORM 内部自动 build 为带绑定参数的 Statement）
        let db = &self.db;
        let stmt_ref = &stmt;
        retry::with_retry("flush_scans", self.retry_config, || async {
            db.execute(stmt_ref).await
        })
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to batch update scan counts (still failed after retries): {}",
                e
            )
        })?;

        debug!(
            "Scan counts flushed to {} database ({} records)",
            self.backend_name.to_uppercase(),
            total_count
        );

        Ok(())
    }
}

#[async_trait]
impl DetailedScanSink for SeaOrmStorage {
    async fn log_scan(&self, detail: ScanDetail) -> anyhow::Result<()> {
        self.log_scans_batch(vec![detail]).await
    }

    async fn log_scans_batch(&self, details: Vec<ScanDetail>) -> anyhow::Result<()> {
        if details.is_empty() {
            return Ok(());
        }

        let total_count = details.len();

        // 构建批量插入的 ActiveModel 列表
        let models: Vec<scan_log::ActiveModel> = details
            .iter()
            .map(|detail| scan_log::ActiveModel {
                qr_code_id: Set(detail.qr_code_id.clone()),
                scanned_at: Set(detail.timestamp),
                ip_address: Set(detail.ip_address.clone()),
                user_agent_hash: Set(detail.user_agent_hash.clone()),
                device_type: Set(detail.device_type.clone()),
                os: Set(detail.os.clone()),
                browser: Set(detail.browser.clone()),
                country: Set(detail.country.clone()),
                city: Set(detail.city.clone()),
                referrer: Set(detail.referrer.clone()),
                ..Default::default()
            })
            .collect();

        // 使用 insert_many 进行批量插入
        let db = &self.db;
        retry::with_retry("log_scans_batch", self.retry_config, || async {
            scan_log::Entity::insert_many(models.clone()).exec(db).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to batch insert scan logs: {}", e))?;

        debug!(
            "Detailed scan logs written to {} database ({} records)",
            self.backend_name.to_uppercase(),
            total_count
        );

        Ok(())
    }
}
