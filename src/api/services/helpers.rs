//! API 帮助函数：统一响应构建、Cookie 构建器、限流 key 提取

use actix_governor::{Governor, GovernorConfigBuilder, KeyExtractor, SimpleKeyExtractionError};
use actix_web::HttpResponse;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::ServiceRequest;
use actix_web::http::StatusCode;
use governor::middleware::NoOpMiddleware;
use rand::RngExt;
use serde::Serialize;
use tracing::debug;

use crate::api::constants;
use crate::api::types::{ApiResponse, ErrorCode, error_response};
use crate::config::SameSitePolicy;
use crate::errors::QrifyError;
use crate::utils::ip::is_trusted_proxy;

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

/// 构建成功响应
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "ok", Some(data))
}

/// 统一 Result → HttpResponse 转换
///
/// 成功时返回 200 OK + JSON 数据，失败时自动映射 QrifyError。
pub fn api_result<T, E>(result: Result<T, E>) -> HttpResponse
where
    T: Serialize,
    E: Into<QrifyError>,
{
    match result {
        Ok(data) => success_response(data),
        Err(e) => {
            let err: QrifyError = e.into();
            error_response(&err)
        }
    }
}

/// 从请求扩展里取认证上下文并加载完整用户
///
/// 中间件已验证过 token；这里再校验账号仍然存在且未被停用。
pub async fn current_user(
    req: &actix_web::HttpRequest,
    storage: &crate::storage::SeaOrmStorage,
) -> Result<crate::storage::User, QrifyError> {
    use actix_web::HttpMessage;

    let ctx = req
        .extensions()
        .get::<crate::api::middleware::AuthContext>()
        .cloned()
        .ok_or_else(|| QrifyError::unauthorized("authentication required"))?;

    let user = storage
        .get_user_by_id(&ctx.user_id)
        .await?
        .ok_or_else(|| QrifyError::unauthorized("account no longer exists"))?;

    if !user.is_active {
        return Err(QrifyError::forbidden("this account has been deactivated"));
    }

    Ok(user)
}

/// 生成 CSRF Token（32 bytes = 256 bits，Base64 编码）
pub fn generate_csrf_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// 基于 IP 地址的限流 key 提取器
///
/// 策略：
/// - 默认使用连接 IP（peer_addr），无法被伪造
/// - 如果连接来自配置的可信代理，则使用 X-Forwarded-For
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = String;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> Result<Self::Key, Self::KeyExtractionError> {
        let conn_info = req.connection_info();

        let peer_ip = conn_info
            .peer_addr()
            .ok_or_else(|| SimpleKeyExtractionError::new("Unable to extract peer IP"))?;

        let trusted_proxies = &crate::config::get_config().auth.trusted_proxies;

        if !trusted_proxies.is_empty() && is_trusted_proxy(peer_ip, trusted_proxies) {
            let real_ip = conn_info.realip_remote_addr().unwrap_or(peer_ip);
            debug!("Rate limit key from trusted proxy: {}", real_ip);
            Ok(real_ip.to_string())
        } else {
            Ok(peer_ip.to_string())
        }
    }
}

/// 登录/注册限流器：每秒补充 1 个令牌，突发最多 5 次
pub fn login_rate_limiter() -> Governor<ClientIpKeyExtractor, NoOpMiddleware> {
    let config = GovernorConfigBuilder::default()
        .seconds_per_request(1)
        .burst_size(5)
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .expect("Invalid rate limit config");

    debug!("Login rate limiter created: 1 req/s, burst 5");
    Governor::new(&config)
}

/// 预览限流器：每分钟 5 次
pub fn preview_rate_limiter() -> Governor<ClientIpKeyExtractor, NoOpMiddleware> {
    let config = GovernorConfigBuilder::default()
        .seconds_per_request(12)
        .burst_size(5)
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .expect("Invalid rate limit config");

    debug!("Preview rate limiter created: 5 req/min");
    Governor::new(&config)
}

/// Cookie 构建器，消除重复的 cookie 创建代码
pub struct CookieBuilder {
    same_site: SameSite,
    secure: bool,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl CookieBuilder {
    pub fn from_config() -> Self {
        let config = crate::config::get_config();

        let same_site = match config.auth.cookie_same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::None => SameSite::None,
            SameSitePolicy::Lax => SameSite::Lax,
        };

        Self {
            same_site,
            secure: config.auth.cookie_secure,
            access_ttl_secs: config.auth.access_ttl_secs,
            refresh_ttl_secs: config.auth.refresh_ttl_secs,
        }
    }

    fn build_cookie_base(
        &self,
        name: String,
        value: String,
        path: String,
        max_age: actix_web::cookie::time::Duration,
    ) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, value);
        cookie.set_path(path);
        cookie.set_http_only(true);
        cookie.set_secure(self.secure);
        cookie.set_same_site(self.same_site);
        cookie.set_max_age(max_age);
        cookie
    }

    pub fn build_access_cookie(&self, token: String) -> Cookie<'static> {
        self.build_cookie_base(
            constants::ACCESS_COOKIE_NAME.to_string(),
            token,
            "/".to_string(),
            actix_web::cookie::time::Duration::seconds(self.access_ttl_secs as i64),
        )
    }

    /// Refresh cookie 只随认证端点发送
    pub fn build_refresh_cookie(&self, token: String) -> Cookie<'static> {
        self.build_cookie_base(
            constants::REFRESH_COOKIE_NAME.to_string(),
            token,
            "/api/auth".to_string(),
            actix_web::cookie::time::Duration::seconds(self.refresh_ttl_secs as i64),
        )
    }

    pub fn build_expired_access_cookie(&self) -> Cookie<'static> {
        self.build_cookie_base(
            constants::ACCESS_COOKIE_NAME.to_string(),
            String::new(),
            "/".to_string(),
            actix_web::cookie::time::Duration::ZERO,
        )
    }

    pub fn build_expired_refresh_cookie(&self) -> Cookie<'static> {
        self.build_cookie_base(
            constants::REFRESH_COOKIE_NAME.to_string(),
            String::new(),
            "/api/auth".to_string(),
            actix_web::cookie::time::Duration::ZERO,
        )
    }

    /// 构建 CSRF Cookie（非 HttpOnly，前端需要读取）
    pub fn build_csrf_cookie(&self, token: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(constants::CSRF_COOKIE_NAME.to_string(), token);
        cookie.set_path("/".to_string());
        // 前端 JS 要把它复制进请求头，不能 HttpOnly
        cookie.set_http_only(false);
        cookie.set_secure(self.secure);
        // Lax 允许顶级导航携带但防止跨站请求
        cookie.set_same_site(SameSite::Lax);
        // 与 access token 同步过期
        cookie.set_max_age(actix_web::cookie::time::Duration::seconds(
            self.access_ttl_secs as i64,
        ));
        cookie
    }

    pub fn build_expired_csrf_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(constants::CSRF_COOKIE_NAME.to_string(), String::new());
        cookie.set_path("/".to_string());
        cookie.set_http_only(false);
        cookie.set_secure(self.secure);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(actix_web::cookie::time::Duration::ZERO);
        cookie
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }
}
