//! Scan analytics service
//!
//! Aggregates scan_logs into per-QR stats and the per-user dashboard
//! overview. The heavy lifting (grouping, cross-backend date formatting)
//! lives in the storage layer; this service adds ownership checks and
//! shapes the API payloads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use migration::entities::scan_log;

use crate::config::TS_EXPORT_PATH;
use crate::errors::{QrifyError, Result};
use crate::storage::{Role, SeaOrmStorage, User};

/// country_breakdown 的 top N
const COUNTRY_TOP_N: u64 = 10;
/// dashboard 最近扫描条数
const RECENT_SCANS: u64 = 10;

// ============ Response DTOs ============

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct DateCount {
    /// %Y-%m-%d
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CountryCount {
    pub country: String,
    pub count: u64,
}

/// Per-QR analytics payload
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct QrStats {
    pub total_scans: u64,
    /// distinct IPs
    pub unique_scans: u64,
    /// ascending by date
    pub scans_by_date: Vec<DateCount>,
    pub device_breakdown: HashMap<String, u64>,
    /// top 10, descending
    pub country_breakdown: Vec<CountryCount>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RecentScan {
    pub qr_code_id: String,
    pub qr_name: String,
    pub scanned_at: DateTime<Utc>,
    pub device_type: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Per-user dashboard payload
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct DashboardOverview {
    pub total_qr_codes: u64,
    /// sum of the per-code counters
    pub total_scans: u64,
    pub active_qr_codes: u64,
    pub inactive_qr_codes: u64,
    pub recent_scans: Vec<RecentScan>,
}

// ============ StatsService ============

/// Service for scan analytics queries
pub struct StatsService {
    storage: Arc<SeaOrmStorage>,
}

impl StatsService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Per-QR stats; owner or admin only
    pub async fn qr_stats(&self, qr_id: &str, requester: &User) -> Result<QrStats> {
        let qr = self
            .storage
            .get_qr_by_id(qr_id)
            .await?
            .ok_or_else(|| QrifyError::not_found("QR code not found"))?;
        if qr.user_id != requester.id && requester.role != Role::Admin {
            return Err(QrifyError::not_found("QR code not found"));
        }

        let total_scans = self
            .storage
            .count_qr_scans(qr_id)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?;
        let unique_scans = self
            .storage
            .count_qr_unique_scans(qr_id)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?;

        let scans_by_date = self
            .storage
            .get_qr_trend(qr_id)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?
            .into_iter()
            .map(|row| DateCount {
                date: row.label,
                count: row.count.max(0) as u64,
            })
            .collect();

        let device_breakdown = self
            .storage
            .get_qr_breakdown(qr_id, scan_log::Column::DeviceType, 100)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?
            .into_iter()
            .filter_map(|row| row.label.map(|label| (label, row.count.max(0) as u64)))
            .collect();

        let country_breakdown = self
            .storage
            .get_qr_breakdown(qr_id, scan_log::Column::Country, COUNTRY_TOP_N)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?
            .into_iter()
            .filter_map(|row| {
                row.label.map(|country| CountryCount {
                    country,
                    count: row.count.max(0) as u64,
                })
            })
            .collect();

        Ok(QrStats {
            total_scans,
            unique_scans,
            scans_by_date,
            device_breakdown,
            country_breakdown,
        })
    }

    /// Per-user dashboard: totals + the most recent scans
    pub async fn dashboard_overview(&self, user_id: &str) -> Result<DashboardOverview> {
        let totals = self
            .storage
            .get_user_qr_totals(user_id)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?;

        let recent_scans = self
            .storage
            .get_recent_scans(user_id, RECENT_SCANS)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?
            .into_iter()
            .map(|row| RecentScan {
                qr_code_id: row.qr_code_id,
                qr_name: row.qr_name,
                scanned_at: row.scanned_at,
                device_type: row.device_type,
                country: row.country,
                city: row.city,
            })
            .collect();

        Ok(DashboardOverview {
            total_qr_codes: totals.total_qrs,
            total_scans: totals.total_scans,
            active_qr_codes: totals.active_qrs,
            inactive_qr_codes: totals.total_qrs.saturating_sub(totals.active_qrs),
            recent_scans,
        })
    }
}
