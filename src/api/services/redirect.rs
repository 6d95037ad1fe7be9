//! 扫码跳转热路径
//!
//! `GET|HEAD /r/{code}`：缓存链查短码 -> 状态检查 -> 缓冲计数 ->
//! 后台记录扫描详情 -> 按类型重写目标 -> 302。
//!
//! 统计失败绝不影响跳转本身。

use std::borrow::Cow;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use tracing::{debug, error, trace};

use crate::analytics::ScanDetail;
use crate::analytics::global::get_scan_manager;
use crate::api::types::{ApiResponse, ErrorCode};
use crate::cache::{CacheResult, CompositeCacheTrait};
use crate::config::get_config;
use crate::services::{GeoIpProvider, user_agent_store};
use crate::storage::{QrCode, SeaOrmStorage};
use crate::utils::ip::client_ip;
use crate::utils::is_valid_short_code;
use crate::utils::url_validator::rewrite_destination;

/// 预览短码前缀；预览码只走缓存，不计数不记日志
pub const PREVIEW_PREFIX: &str = "preview-";

pub struct RedirectService {}

impl RedirectService {
    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        cache: web::Data<Arc<dyn CompositeCacheTrait>>,
        storage: web::Data<Arc<SeaOrmStorage>>,
        geoip: Option<web::Data<Arc<GeoIpProvider>>>,
    ) -> impl Responder {
        let raw = path.into_inner();
        let code = match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.trim().to_string(),
            Err(_) => raw.trim().to_string(),
        };

        if code.is_empty() {
            return Self::not_found_response();
        }

        // 预览码：缓存里才有，过期即 404
        if let Some(rest) = code.strip_prefix(PREVIEW_PREFIX) {
            if rest.is_empty() {
                return Self::not_found_response();
            }
            return Self::process_preview(&code, cache).await;
        }

        if !is_valid_short_code(&code) {
            trace!("Invalid short code rejected: {}", code);
            return Self::not_found_response();
        }

        Self::process_redirect(code, req, cache, storage, geoip).await
    }

    async fn process_redirect(
        code: String,
        req: HttpRequest,
        cache: web::Data<Arc<dyn CompositeCacheTrait>>,
        storage: web::Data<Arc<SeaOrmStorage>>,
        geoip: Option<web::Data<Arc<GeoIpProvider>>>,
    ) -> HttpResponse {
        match cache.get(&code).await {
            CacheResult::Found(qr) => Self::serve(&code, qr, &req, geoip),
            CacheResult::ExistsButNoValue => {
                trace!("Cache miss for code: {}", code);
                match storage.get_qr_by_code(&code).await {
                    Some(qr) => {
                        cache.insert(code.clone(), qr.clone()).await;
                        Self::serve(&code, qr, &req, geoip)
                    }
                    None => {
                        // Bloom 假阳性或刚删除的码
                        debug!("QR code not found in database: {}", code);
                        cache.mark_not_found(&code).await;
                        Self::not_found_response()
                    }
                }
            }
            CacheResult::NotFound => {
                debug!("Cache negative for code: {}", code);
                Self::not_found_response()
            }
        }
    }

    /// 预览跳转：只查缓存，不计数、不记日志
    async fn process_preview(
        code: &str,
        cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    ) -> HttpResponse {
        match cache.get(code).await {
            CacheResult::Found(qr) => {
                if !qr.is_active || qr.original_data.trim().is_empty() {
                    return Self::not_found_response();
                }
                // 预览只对 url 类型做协议补全
                let target = if qr.qr_type == "url" {
                    rewrite_destination(&qr.qr_type, &qr.original_data)
                } else {
                    qr.original_data.trim().to_string()
                };
                if target.is_empty() {
                    return Self::not_found_response();
                }
                HttpResponse::build(StatusCode::FOUND)
                    .insert_header(("Location", target))
                    .finish()
            }
            _ => Self::not_found_response(),
        }
    }

    /// 状态检查 -> 计数 -> 详情任务 -> 重写 -> 302
    fn serve(
        code: &str,
        qr: QrCode,
        req: &HttpRequest,
        geoip: Option<web::Data<Arc<GeoIpProvider>>>,
    ) -> HttpResponse {
        // 1. 旧数据兜底：目标为空的行无法跳转
        if qr.original_data.trim().is_empty() {
            return Self::state_error(
                StatusCode::BAD_REQUEST,
                "this QR code has no destination configured",
            );
        }

        // 2. 已被所有者停用
        if !qr.is_active {
            return Self::state_error(
                StatusCode::FORBIDDEN,
                "this QR code has been deactivated by its owner",
            );
        }

        // 3. 扫描上限：已落库计数 + 本进程缓冲增量，计数前检查，保证不超发
        let pending = get_scan_manager()
            .map(|m| m.pending_for(code) as u64)
            .unwrap_or(0);
        if qr.limit_reached(pending) {
            return Self::state_error(
                StatusCode::FORBIDDEN,
                "this QR code has reached its scan limit",
            );
        }

        // 4. 过期
        if qr.is_expired(chrono::Utc::now()) {
            return Self::state_error(StatusCode::FORBIDDEN, "this QR code has expired");
        }

        Self::record_scan(&qr, req, geoip);

        // 重写目标并校验
        let target = rewrite_destination(&qr.qr_type, &qr.original_data);
        if target.is_empty() {
            error!("Empty destination after rewrite for code: {}", code);
            return Self::destination_error("destination is not configured");
        }
        if target.starts_with("http://") || target.starts_with("https://") {
            match url::Url::parse(&target) {
                Ok(_) => {}
                Err(e) => {
                    error!("Unparseable destination for code {}: {}", code, e);
                    return Self::destination_error("invalid destination URL");
                }
            }
        }

        let target = Self::merge_query(req, &target);

        HttpResponse::build(StatusCode::FOUND)
            .insert_header(("Location", target.as_ref()))
            .finish()
    }

    /// 缓冲计数 + 派发详情任务
    ///
    /// 同步阶段只摘取原始请求数据，解析和 Geo 查询都在后台任务里。
    fn record_scan(qr: &QrCode, req: &HttpRequest, geoip: Option<web::Data<Arc<GeoIpProvider>>>) {
        let analytics = &get_config().analytics;
        if !analytics.enable_tracking {
            return;
        }

        let Some(manager) = get_scan_manager() else {
            return;
        };
        manager.increment(&qr.short_code);

        if !analytics.enable_detailed_logging || !manager.is_detailed_logging_enabled() {
            return;
        }

        let qr_code_id = qr.id.clone();
        let referrer = req
            .headers()
            .get("referer")
            .and_then(|h| h.to_str().ok())
            .map(String::from);
        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);
        let ip = client_ip(req);
        let enable_ip_logging = analytics.enable_ip_logging;
        let enable_geoip = analytics.enable_geoip;
        let geoip = geoip.map(|g| Arc::clone(g.get_ref()));
        let manager = Arc::clone(manager);

        tokio::spawn(async move {
            let mut detail = ScanDetail::new(qr_code_id);
            detail.referrer = referrer;

            if let Some(ref ua) = user_agent
                && let Some(store) = user_agent_store::get_user_agent_store()
            {
                let hash = store.get_or_create_hash(ua);
                let parsed = crate::services::user_agent_store::UserAgentStore::parse_user_agent(
                    ua, &hash,
                );
                detail.user_agent_hash = Some(hash);
                detail.device_type = parsed.device_category;
                detail.os = parsed.os_name;
                detail.browser = parsed.browser_name;
            }

            if enable_ip_logging {
                detail.ip_address = ip.clone();
            }

            // 私网/环回地址在 provider 内部直接跳过
            if enable_geoip
                && let Some(geoip) = geoip
                && let Some(ref ip_str) = ip
                && let Some(geo) = geoip.lookup(ip_str).await
            {
                detail.country = geo.country;
                detail.city = geo.city;
            }

            manager.record_detail(detail);
        });
    }

    /// http(s) 目标透传请求 query，目标已有的参数优先
    fn merge_query<'a>(req: &HttpRequest, target: &'a str) -> Cow<'a, str> {
        if !(target.starts_with("http://") || target.starts_with("https://")) {
            return Cow::Borrowed(target);
        }
        let Some(query) = req.uri().query() else {
            return Cow::Borrowed(target);
        };
        if query.is_empty() {
            return Cow::Borrowed(target);
        }

        let Ok(mut parsed) = url::Url::parse(target) else {
            return Cow::Borrowed(target);
        };
        let existing: Vec<String> = parsed
            .query_pairs()
            .map(|(k, _)| k.into_owned())
            .collect();

        let mut appended = false;
        {
            let mut pairs = parsed.query_pairs_mut();
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if existing.iter().any(|k| k == key.as_ref()) {
                    continue;
                }
                pairs.append_pair(&key, &value);
                appended = true;
            }
        }

        if appended {
            Cow::Owned(parsed.to_string())
        } else {
            Cow::Borrowed(target)
        }
    }

    #[inline]
    fn not_found_response() -> HttpResponse {
        HttpResponse::build(StatusCode::NOT_FOUND)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")
    }

    #[inline]
    fn state_error(status: StatusCode, message: &str) -> HttpResponse {
        let code = match status {
            StatusCode::BAD_REQUEST => ErrorCode::BadRequest,
            _ => ErrorCode::Forbidden,
        };
        HttpResponse::build(status).json(ApiResponse::<()>::error(code, message))
    }

    #[inline]
    fn destination_error(message: &str) -> HttpResponse {
        HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
            .json(ApiResponse::<()>::error(ErrorCode::QrInvalidDestination, message))
    }
}

/// Redirect 路由配置
pub fn redirect_routes() -> actix_web::Scope {
    web::scope("/r")
        .route("/{code}", web::get().to(RedirectService::handle_redirect))
        .route("/{code}", web::head().to(RedirectService::handle_redirect))
}
