//! API 类型定义
//!
//! 统一响应壳 `{code, message, data}`、错误码枚举和请求/响应 DTO。
//! 带 TS 导出供 dashboard 使用。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use ts_rs::TS;

use crate::config::TS_EXPORT_PATH;
use crate::errors::QrifyError;
use crate::storage::{PlanTier, QrCode, QrType, Role, Subscription, User};

/// API 错误码枚举
///
/// 使用 serde_repr 序列化为数字，ts-rs 自动生成 TypeScript 类型。
/// 按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 2000-2099: 认证错误
/// - 3000-3099: QR 码错误
/// - 4000-4099: 账单错误
/// - 5000-5099: 账户错误
/// - 6000-6099: 统计错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[ts(rename = "ErrorCode")]
#[ts(repr(enum))]
#[repr(i32)]
pub enum ErrorCode {
    // 成功
    Success = 0,

    // 通用错误 1000-1099
    BadRequest = 1000,
    Unauthorized = 1001,
    Forbidden = 1003,
    NotFound = 1004,
    InternalServerError = 1005,
    FileTooLarge = 1011,
    ServiceUnavailable = 1030,

    // 认证错误 2000-2099
    AuthFailed = 2000,
    TokenExpired = 2001,
    TokenInvalid = 2002,
    CsrfInvalid = 2003,
    RateLimitExceeded = 2004,

    // QR 码错误 3000-3099
    QrNotFound = 3000,
    QrInvalidDestination = 3001,
    QrNotDynamic = 3002,
    PlanLimitReached = 3003,
    QrRenderFailed = 3004,

    // 账单错误 4000-4099
    PaymentProviderError = 4000,
    WebhookSignatureInvalid = 4001,
    SubscriptionNotFound = 4002,

    // 账户错误 5000-5099
    EmailTaken = 5000,
    PasswordIncorrect = 5001,
    PasswordChangeUnavailable = 5002,

    // 统计错误 6000-6099
    AnalyticsQueryFailed = 6000,
}

/// 统一响应壳
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: ErrorCode::Success as i32,
            message: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }
}

/// QrifyError -> ErrorCode 映射
pub fn error_code_for(err: &QrifyError) -> ErrorCode {
    match err {
        QrifyError::Validation(_) => ErrorCode::BadRequest,
        QrifyError::Unauthorized(_) => ErrorCode::AuthFailed,
        QrifyError::Forbidden(_) => ErrorCode::Forbidden,
        QrifyError::NotFound(_) => ErrorCode::NotFound,
        QrifyError::Conflict(_) => ErrorCode::EmailTaken,
        QrifyError::PlanLimit(_) => ErrorCode::PlanLimitReached,
        QrifyError::QrRender(_) => ErrorCode::QrRenderFailed,
        QrifyError::PaymentProvider(_) => ErrorCode::PaymentProviderError,
        QrifyError::WebhookSignature(_) => ErrorCode::WebhookSignatureInvalid,
        QrifyError::DateParse(_) => ErrorCode::BadRequest,
        _ => ErrorCode::InternalServerError,
    }
}

/// QrifyError -> HTTP 响应（按 http_status 映射状态码）
pub fn error_response(err: &QrifyError) -> actix_web::HttpResponse {
    use actix_web::HttpResponse;
    use actix_web::http::StatusCode;

    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = error_code_for(err);

    // 套餐限额时附带 upgrade_required 提示给前端弹窗
    let data = if matches!(err, QrifyError::PlanLimit(_)) {
        Some(serde_json::json!({ "upgrade_required": true }))
    } else {
        None
    };

    HttpResponse::build(status).json(ApiResponse::<serde_json::Value> {
        code: code as i32,
        message: err.message().to_string(),
        data,
    })
}

// ============ 分页 ============

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaginatedResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
    pub pagination: PaginationInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PaginationInfo {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationInfo {
    pub fn new(page: u64, page_size: u64, total: u64) -> Self {
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size.max(1)),
        }
    }
}

// ============ 认证 DTO ============

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserResponse,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct VerifyResponse {
    pub user_id: String,
    pub role: Role,
    pub expires_at: i64,
}

// ============ 用户 DTO ============

/// 对外的用户视图（永不携带密码哈希）
#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub provider: String,
    pub role: Role,
    pub plan: PlanTier,
    pub is_active: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            provider: user.provider.to_string(),
            role: user.role,
            plan: user.plan,
            is_active: user.is_active,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateProfilePayload {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ChangePasswordPayload {
    pub current_password: String,
    pub new_password: String,
}

// ============ QR DTO ============

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CreateQrPayload {
    pub name: String,
    pub qr_type: QrType,
    pub data: String,
    /// 默认 true；静态码内容烧死在图里，但仍保留短码供 /i 寻址
    pub is_dynamic: Option<bool>,
    pub expires_at: Option<String>,
    pub scan_limit: Option<u64>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub gradient: Option<String>,
    pub eye_shape: Option<String>,
    pub module_style: Option<String>,
    pub logo_data: Option<String>,
}

/// PATCH /api/qr/{id}。双层 Option：外层缺省 = 不改，内层 null = 清除
#[derive(Serialize, Deserialize, Clone, Debug, Default, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateQrPayload {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, with = "serde_double_option")]
    #[ts(optional, as = "Option<Option<String>>")]
    pub expires_at: Option<Option<String>>,
    #[serde(default, with = "serde_double_option")]
    #[ts(optional, as = "Option<Option<u64>>")]
    pub scan_limit: Option<Option<u64>>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    #[serde(default, with = "serde_double_option")]
    #[ts(optional, as = "Option<Option<String>>")]
    pub gradient: Option<Option<String>>,
    pub eye_shape: Option<String>,
    pub module_style: Option<String>,
    #[serde(default, with = "serde_double_option")]
    #[ts(optional, as = "Option<Option<String>>")]
    pub logo_data: Option<Option<String>>,
}

/// 序列化双层 Option：字段缺省 vs 显式 null
mod serde_double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateDestinationPayload {
    pub data: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct QrResponse {
    pub id: String,
    pub name: String,
    pub qr_type: String,
    pub original_data: String,
    pub short_code: String,
    pub short_url: String,
    pub image_url: String,
    pub is_dynamic: bool,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub scan_limit: Option<u64>,
    pub scan_count: u64,
    pub foreground_color: String,
    pub background_color: String,
    pub gradient: Option<String>,
    pub eye_shape: String,
    pub module_style: String,
    pub has_logo: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<QrCode> for QrResponse {
    fn from(qr: QrCode) -> Self {
        let short_url = crate::services::QrService::short_url(&qr.short_code);
        let image_url = crate::services::QrService::image_url(&qr.short_code);
        Self {
            id: qr.id,
            name: qr.name,
            qr_type: qr.qr_type,
            original_data: qr.original_data,
            short_code: qr.short_code,
            short_url,
            image_url,
            is_dynamic: qr.is_dynamic,
            is_active: qr.is_active,
            expires_at: qr.expires_at.map(|dt| dt.to_rfc3339()),
            scan_limit: qr.scan_limit,
            scan_count: qr.scan_count,
            foreground_color: qr.foreground_color,
            background_color: qr.background_color,
            gradient: qr.gradient,
            eye_shape: qr.eye_shape,
            module_style: qr.module_style,
            has_logo: qr.logo_data.is_some(),
            created_at: qr.created_at.to_rfc3339(),
            updated_at: qr.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct GetQrsQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub only_active: Option<bool>,
    pub qr_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PreviewPayload {
    pub qr_type: QrType,
    pub data: String,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub gradient: Option<String>,
    pub eye_shape: Option<String>,
    pub module_style: Option<String>,
    pub logo_data: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct EmbedResponse {
    pub name: String,
    pub short_url: String,
    pub image_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct LogoUploadResponse {
    /// data URI，随后在 create/update 时带回
    pub logo_data: String,
    pub content_type: String,
    pub size_bytes: u64,
}

// ============ 账单 DTO ============

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CreateOrderPayload {
    pub plan: PlanTier,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubscriptionResponse {
    pub id: String,
    pub plan: PlanTier,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub start_date: String,
    pub end_date: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            plan: sub.plan,
            amount: sub.amount,
            currency: sub.currency,
            status: sub.status.to_string(),
            start_date: sub.start_date.to_rfc3339(),
            end_date: sub.end_date.map(|dt| dt.to_rfc3339()),
        }
    }
}

// ============ 管理端 DTO ============

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct GetUsersQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub plan: Option<String>,
    pub only_active: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AdminUpdateUserPayload {
    pub role: Option<Role>,
    pub plan: Option<PlanTier>,
    pub is_active: Option<bool>,
}

/// 管理端 QR 列表行（附带所有者邮箱）
#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AdminQrRow {
    #[serde(flatten)]
    #[ts(flatten)]
    pub qr: QrResponse,
    pub owner_email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PurgeResponse {
    pub purged: u64,
}

// ============ 解析工具 ============

/// RFC3339 字符串 -> DateTime
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, QrifyError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QrifyError::date_parse(format!("invalid RFC3339 timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code_for(&QrifyError::validation("x")),
            ErrorCode::BadRequest
        );
        assert_eq!(
            error_code_for(&QrifyError::plan_limit("x")),
            ErrorCode::PlanLimitReached
        );
        assert_eq!(
            error_code_for(&QrifyError::webhook_signature("x")),
            ErrorCode::WebhookSignatureInvalid
        );
        assert_eq!(
            error_code_for(&QrifyError::database_operation("x")),
            ErrorCode::InternalServerError
        );
    }

    #[test]
    fn test_update_qr_payload_double_option() {
        // 缺省字段 -> None（不改）
        let patch: UpdateQrPayload = serde_json::from_str(r#"{"name":"hi"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("hi"));
        assert!(patch.scan_limit.is_none());

        // 显式 null -> Some(None)（清除）
        let patch: UpdateQrPayload = serde_json::from_str(r#"{"scan_limit":null}"#).unwrap();
        assert_eq!(patch.scan_limit, Some(None));

        // 有值 -> Some(Some(v))
        let patch: UpdateQrPayload = serde_json::from_str(r#"{"scan_limit":100}"#).unwrap();
        assert_eq!(patch.scan_limit, Some(Some(100)));
    }

    #[test]
    fn test_pagination_total_pages() {
        assert_eq!(PaginationInfo::new(1, 10, 0).total_pages, 0);
        assert_eq!(PaginationInfo::new(1, 10, 10).total_pages, 1);
        assert_eq!(PaginationInfo::new(1, 10, 11).total_pages, 2);
    }

    #[test]
    fn test_parse_rfc3339() {
        assert!(parse_rfc3339("2026-01-01T00:00:00Z").is_ok());
        assert!(parse_rfc3339("not-a-date").is_err());
    }

    #[test]
    fn export_typescript_types() {
        // 运行此测试会自动生成 TypeScript 类型文件
        // cargo test export_typescript_types -- --nocapture

        ErrorCode::export_all(&ts_rs::Config::from_env()).expect("Failed to export ErrorCode");
        PaginationInfo::export_all(&ts_rs::Config::from_env()).expect("Failed to export PaginationInfo");
        RegisterPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export RegisterPayload");
        LoginPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export LoginPayload");
        LoginResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export LoginResponse");
        VerifyResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export VerifyResponse");
        UserResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export UserResponse");
        UpdateProfilePayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export UpdateProfilePayload");
        ChangePasswordPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export ChangePasswordPayload");
        CreateQrPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export CreateQrPayload");
        UpdateQrPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export UpdateQrPayload");
        UpdateDestinationPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export UpdateDestinationPayload");
        QrResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export QrResponse");
        GetQrsQuery::export_all(&ts_rs::Config::from_env()).expect("Failed to export GetQrsQuery");
        PreviewPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export PreviewPayload");
        EmbedResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export EmbedResponse");
        LogoUploadResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export LogoUploadResponse");
        CreateOrderPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export CreateOrderPayload");
        SubscriptionResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export SubscriptionResponse");
        GetUsersQuery::export_all(&ts_rs::Config::from_env()).expect("Failed to export GetUsersQuery");
        AdminUpdateUserPayload::export_all(&ts_rs::Config::from_env()).expect("Failed to export AdminUpdateUserPayload");
        AdminQrRow::export_all(&ts_rs::Config::from_env()).expect("Failed to export AdminQrRow");
        PurgeResponse::export_all(&ts_rs::Config::from_env()).expect("Failed to export PurgeResponse");
    }
}
