//! Analytics 相关的数据库查询
//!
//! 提供扫描日志的统计查询方法，供 StatsService 调用。

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, ExprTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

use migration::entities::{qr_code, scan_log};

// ============ 查询结果类型 ============

/// 趋势查询结果行（label = 格式化日期）
#[derive(Debug, FromQueryResult)]
pub struct TrendRow {
    pub label: String,
    pub count: i64,
}

/// 通用分组统计结果行（device/os/browser/country）
#[derive(Debug, FromQueryResult)]
pub struct BreakdownRow {
    pub label: Option<String>,
    pub count: i64,
}

/// 地理位置查询结果行
#[derive(Debug, FromQueryResult)]
pub struct GeoRow {
    pub country: Option<String>,
    pub city: Option<String>,
    pub count: i64,
}

/// 最近扫描查询结果行（scan_logs JOIN qr_codes 取名称）
#[derive(Debug, FromQueryResult)]
pub struct RecentScanRow {
    pub qr_code_id: String,
    pub qr_name: String,
    pub scanned_at: DateTime<Utc>,
    pub device_type: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Dashboard 总量聚合结果
#[derive(Debug, FromQueryResult)]
struct QrTotalsResult {
    total_qrs: i64,
    total_scans: Option<i64>,
    active_qrs: Option<i64>,
}

/// Dashboard 总量（单条聚合查询）
#[derive(Debug, Default, Clone, Copy)]
pub struct QrTotals {
    pub total_qrs: u64,
    pub total_scans: u64,
    pub active_qrs: u64,
}

// ============ SeaOrmStorage Analytics 方法 ============

impl super::SeaOrmStorage {
    /// 按日期分组的格式化表达式（跨后端）
    pub fn date_format_expr(&self) -> SimpleExpr {
        let col = Expr::col((scan_log::Entity, scan_log::Column::ScannedAt));
        match self.backend_name.as_str() {
            "mysql" => Expr::cust_with_expr("DATE_FORMAT($1, '%Y-%m-%d')", col),
            "postgres" => Expr::cust_with_expr("to_char($1, 'YYYY-MM-DD')", col),
            // SQLite
            _ => Expr::cust_with_expr("strftime('%Y-%m-%d', $1)", col),
        }
    }

    /// 指定 QR 码的扫描日志总数
    pub async fn count_qr_scans(&self, qr_id: &str) -> anyhow::Result<u64> {
        scan_log::Entity::find()
            .filter(scan_log::Column::QrCodeId.eq(qr_id))
            .count(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 指定 QR 码的独立扫描数（按 IP 去重）
    pub async fn count_qr_unique_scans(&self, qr_id: &str) -> anyhow::Result<u64> {
        #[derive(Debug, FromQueryResult)]
        struct CountRow {
            count: i64,
        }

        let row = scan_log::Entity::find()
            .select_only()
            .column_as(
                SimpleExpr::from(Func::count_distinct(Expr::col((
                    scan_log::Entity,
                    scan_log::Column::IpAddress,
                )))),
                "count",
            )
            .filter(scan_log::Column::QrCodeId.eq(qr_id))
            .filter(scan_log::Column::IpAddress.is_not_null())
            .into_model::<CountRow>()
            .one(&self.db)
            .await?;

        Ok(row.map(|r| Ord::max(r.count, 0) as u64).unwrap_or(0))
    }

    /// 扫描趋势（%Y-%m-%d 分组，升序）
    pub async fn get_qr_trend(&self, qr_id: &str) -> anyhow::Result<Vec<TrendRow>> {
        let date_expr = self.date_format_expr();
        scan_log::Entity::find()
            .select_only()
            .column_as(date_expr.clone(), "label")
            .column_as(scan_log::Column::Id.count(), "count")
            .filter(scan_log::Column::QrCodeId.eq(qr_id))
            .group_by(date_expr)
            .order_by_asc(Expr::cust("label"))
            .into_model::<TrendRow>()
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 设备/系统/浏览器分布（label 列由调用方指定）
    pub async fn get_qr_breakdown(
        &self,
        qr_id: &str,
        column: scan_log::Column,
        limit: u64,
    ) -> anyhow::Result<Vec<BreakdownRow>> {
        scan_log::Entity::find()
            .select_only()
            .column_as(Expr::col((scan_log::Entity, column)), "label")
            .column_as(scan_log::Column::Id.count(), "count")
            .filter(scan_log::Column::QrCodeId.eq(qr_id))
            .filter(column.is_not_null())
            .group_by(column)
            .order_by_desc(Expr::cust("count"))
            .limit(limit)
            .into_model::<BreakdownRow>()
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 地理分布（country + city，top N）
    pub async fn get_qr_geo(&self, qr_id: &str, limit: u64) -> anyhow::Result<Vec<GeoRow>> {
        scan_log::Entity::find()
            .select_only()
            .column(scan_log::Column::Country)
            .column(scan_log::Column::City)
            .column_as(scan_log::Column::Id.count(), "count")
            .filter(scan_log::Column::QrCodeId.eq(qr_id))
            .filter(scan_log::Column::Country.is_not_null())
            .group_by(scan_log::Column::Country)
            .group_by(scan_log::Column::City)
            .order_by_desc(Expr::cust("count"))
            .limit(limit)
            .into_model::<GeoRow>()
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    // ============ Dashboard（按用户聚合） ============

    /// 用户名下 QR 码总量聚合（总数 / 总扫描 / 活跃数）
    pub async fn get_user_qr_totals(&self, user_id: &str) -> anyhow::Result<QrTotals> {
        let result = qr_code::Entity::find()
            .select_only()
            .column_as(qr_code::Column::Id.count(), "total_qrs")
            .column_as(qr_code::Column::ScanCount.sum(), "total_scans")
            // SUM(CASE WHEN is_active THEN 1 ELSE 0 END)
            .column_as(
                Expr::case(Condition::all().add(qr_code::Column::IsActive.eq(true)), 1)
                    .finally(0)
                    .sum(),
                "active_qrs",
            )
            .filter(qr_code::Column::UserId.eq(user_id))
            .into_model::<QrTotalsResult>()
            .one(&self.db)
            .await?;

        Ok(result
            .map(|r| QrTotals {
                total_qrs: Ord::max(r.total_qrs, 0) as u64,
                total_scans: Ord::max(r.total_scans.unwrap_or(0), 0) as u64,
                active_qrs: Ord::max(r.active_qrs.unwrap_or(0), 0) as u64,
            })
            .unwrap_or_default())
    }

    /// 用户最近 N 次扫描（JOIN qr_codes 取名称，时间倒序）
    pub async fn get_recent_scans(
        &self,
        user_id: &str,
        limit: u64,
    ) -> anyhow::Result<Vec<RecentScanRow>> {
        scan_log::Entity::find()
            .select_only()
            .column(scan_log::Column::QrCodeId)
            .column_as(
                Expr::col((qr_code::Entity, qr_code::Column::QrName)),
                "qr_name",
            )
            .column(scan_log::Column::ScannedAt)
            .column(scan_log::Column::DeviceType)
            .column(scan_log::Column::Country)
            .column(scan_log::Column::City)
            .join_rev(
                sea_orm::JoinType::InnerJoin,
                qr_code::Entity::belongs_to(scan_log::Entity)
                    .from(qr_code::Column::Id)
                    .to(scan_log::Column::QrCodeId)
                    .into(),
            )
            .filter(qr_code::Column::UserId.eq(user_id))
            .order_by_desc(scan_log::Column::ScannedAt)
            .limit(limit)
            .into_model::<RecentScanRow>()
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// 导出扫描日志（数据导出接口，按 QR 码 id 集合过滤）
    pub async fn export_scan_logs(
        &self,
        qr_ids: &[String],
        limit: u64,
    ) -> anyhow::Result<Vec<scan_log::Model>> {
        if qr_ids.is_empty() {
            return Ok(Vec::new());
        }

        scan_log::Entity::find()
            .filter(scan_log::Column::QrCodeId.is_in(qr_ids.iter().cloned()))
            .order_by_desc(scan_log::Column::ScannedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }
}
