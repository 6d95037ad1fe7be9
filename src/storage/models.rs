use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use ts_rs::TS;

use crate::config::TS_EXPORT_PATH;

/// QR code type at creation time.
///
/// Stored as a plain string; rows written by earlier releases may carry
/// values outside this set, so read paths match on the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display, EnumString)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum QrType {
    Url,
    Text,
    Email,
    Phone,
    Whatsapp,
    Wifi,
    Upi,
}

/// User role
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, Display, EnumString,
    AsRefStr, EnumIter,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Subscription plan tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, Display, EnumString,
    AsRefStr, EnumIter,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Business,
}

impl PlanTier {
    /// 套餐价格（INR，主单位）
    pub fn price_inr(&self) -> u64 {
        match self {
            Self::Free => 0,
            Self::Pro => 499,
            Self::Business => 1499,
        }
    }

    /// 套餐允许的最大 QR 码数量
    pub fn qr_limit(&self) -> u64 {
        match self {
            Self::Free => 3,
            Self::Pro => 5,
            Self::Business => 1_000_000,
        }
    }
}

/// Account provider. Password operations are refused for accounts
/// provisioned by an external identity provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, Display, EnumString,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Provider {
    #[default]
    Email,
    Google,
}

/// Payment attempt lifecycle
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, Display, EnumString,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SubscriptionStatus {
    #[default]
    Pending,
    Active,
    Cancelled,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// 原始类型字符串（url/email/phone/whatsapp，历史数据可能有其他值）
    pub qr_type: String,
    /// Destination payload: URL, email address, phone number, ...
    pub original_data: String,
    /// Lookup key under /r/{code} and /i/{code}.svg. Static codes keep one
    /// too so their rendered image stays addressable.
    pub short_code: String,
    pub is_dynamic: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// None = unlimited
    pub scan_limit: Option<u64>,
    #[serde(default)]
    pub scan_count: u64,
    pub foreground_color: String,
    pub background_color: String,
    pub gradient: Option<String>,
    pub eye_shape: String,
    pub module_style: String,
    /// Logo image as a data URI, embedded into rendered SVGs
    pub logo_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QrCode {
    /// 判断是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// 判断扫描次数是否已达上限（effective = 已落库 + 缓冲中）
    pub fn limit_reached(&self, pending: u64) -> bool {
        self.scan_limit
            .is_some_and(|limit| self.scan_count.saturating_add(pending) >= limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// Argon2 PHC string; never serialized into API responses
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub provider: Provider,
    pub role: Role,
    pub plan: PlanTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: PlanTier,
    /// 金额（INR 主单位，不是 paise）
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_pricing_table() {
        assert_eq!(PlanTier::Free.price_inr(), 0);
        assert_eq!(PlanTier::Pro.price_inr(), 499);
        assert_eq!(PlanTier::Business.price_inr(), 1499);

        assert_eq!(PlanTier::Free.qr_limit(), 3);
        assert_eq!(PlanTier::Pro.qr_limit(), 5);
        assert_eq!(PlanTier::Business.qr_limit(), 1_000_000);
    }

    #[test]
    fn test_enum_round_trip() {
        use std::str::FromStr;

        assert_eq!(PlanTier::from_str("pro").unwrap(), PlanTier::Pro);
        assert_eq!(PlanTier::Pro.to_string(), "pro");
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(QrType::from_str("whatsapp").unwrap(), QrType::Whatsapp);
        assert!(QrType::from_str("carrier-pigeon").is_err());
    }

    #[test]
    fn test_limit_reached_counts_pending() {
        let mut qr = test_qr();
        qr.scan_limit = Some(10);
        qr.scan_count = 8;

        assert!(!qr.limit_reached(0));
        assert!(!qr.limit_reached(1));
        assert!(qr.limit_reached(2));
        assert!(qr.limit_reached(5));

        qr.scan_limit = None;
        assert!(!qr.limit_reached(1_000_000));
    }

    #[test]
    fn test_is_expired() {
        let mut qr = test_qr();
        let now = Utc::now();

        qr.expires_at = None;
        assert!(!qr.is_expired(now));

        qr.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(!qr.is_expired(now));

        qr.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(qr.is_expired(now));
    }

    fn test_qr() -> QrCode {
        QrCode {
            id: "00000000-0000-0000-0000-000000000001".to_string(),
            user_id: "00000000-0000-0000-0000-000000000002".to_string(),
            name: "test".to_string(),
            qr_type: "url".to_string(),
            original_data: "example.com".to_string(),
            short_code: "aB3xY9k".to_string(),
            is_dynamic: true,
            is_active: true,
            expires_at: None,
            scan_limit: None,
            scan_count: 0,
            foreground_color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            gradient: None,
            eye_shape: "square".to_string(),
            module_style: "square".to_string(),
            logo_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
