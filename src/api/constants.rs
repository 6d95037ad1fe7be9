//! API 模块常量定义
//!
//! 包含认证、Cookie 等相关的硬编码常量。

/// Access Token Cookie 名称
pub const ACCESS_COOKIE_NAME: &str = "qrify_access";

/// Refresh Token Cookie 名称
pub const REFRESH_COOKIE_NAME: &str = "qrify_refresh";

/// CSRF Token Cookie 名称
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// CSRF double-submit 请求头
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
