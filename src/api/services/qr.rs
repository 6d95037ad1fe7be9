//! QR 码管理端点
//!
//! CRUD、动态改向、公开 preview/embed、logo 上传和 `/i/{code}.svg` 渲染。

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, Result as ActixResult, web};
use base64::Engine;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::{
    CreateQrPayload, EmbedResponse, ErrorCode, GetQrsQuery, LogoUploadResponse,
    PaginatedResponse, PaginationInfo, PreviewPayload, QrResponse, UpdateDestinationPayload,
    UpdateQrPayload, error_response, parse_rfc3339,
};
use crate::cache::CompositeCacheTrait;
use crate::errors::QrifyError;
use crate::services::render::{QrDesign, render_qr_svg};
use crate::services::{CreateQrRequest, QrService, UpdateQrRequest};
use crate::storage::{QrCode, QrFilter, SeaOrmStorage};
use crate::utils::generate_random_code;

use super::helpers::{current_user, json_response, preview_rate_limiter, success_response};
use super::redirect::PREVIEW_PREFIX;

/// logo 上传大小上限
const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;
/// 允许的 logo MIME 类型
const ALLOWED_LOGO_TYPES: &[&str] = &["image/png", "image/jpeg", "image/svg+xml", "image/webp"];
/// 预览码随机部分长度
const PREVIEW_CODE_LENGTH: usize = 10;

fn qr_service(
    storage: &web::Data<Arc<SeaOrmStorage>>,
    cache: &web::Data<Arc<dyn CompositeCacheTrait>>,
) -> QrService {
    QrService::new(storage.get_ref().clone(), cache.get_ref().clone())
}

/// POST /api/qr
pub async fn create_qr(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    payload: web::Json<CreateQrPayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let payload = payload.into_inner();
    let expires_at = match payload.expires_at.as_deref() {
        Some(value) => match parse_rfc3339(value) {
            Ok(dt) => Some(dt),
            Err(e) => return Ok(error_response(&e)),
        },
        None => None,
    };

    let service = qr_service(&storage, &cache);
    let result = service
        .create_qr(
            &user,
            CreateQrRequest {
                name: payload.name,
                qr_type: payload.qr_type,
                data: payload.data,
                is_dynamic: payload.is_dynamic.unwrap_or(true),
                expires_at,
                scan_limit: payload.scan_limit,
                foreground_color: payload.foreground_color,
                background_color: payload.background_color,
                gradient: payload.gradient,
                eye_shape: payload.eye_shape,
                module_style: payload.module_style,
                logo_data: payload.logo_data,
            },
        )
        .await;

    match result {
        Ok(qr) => {
            info!("QR API: user {} created '{}'", user.id, qr.short_code);
            Ok(success_response(QrResponse::from(qr)))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/qr
pub async fn list_qrs(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    query: web::Query<GetQrsQuery>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let query = query.into_inner();
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(20);
    let filter = QrFilter {
        search: query.search,
        user_id: None,
        only_active: query.only_active.unwrap_or(false),
        qr_type: query.qr_type,
    };

    let service = qr_service(&storage, &cache);
    match service.list_qrs(&user.id, filter, page, page_size).await {
        Ok((qrs, total)) => {
            let data: Vec<QrResponse> = qrs.into_iter().map(QrResponse::from).collect();
            Ok(HttpResponse::Ok().json(PaginatedResponse {
                code: ErrorCode::Success as i32,
                message: "ok".to_string(),
                data,
                pagination: PaginationInfo::new(page.max(1), page_size.clamp(1, 100), total),
            }))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/qr/{id}
pub async fn get_qr(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = qr_service(&storage, &cache);
    match service.get_qr(&path.into_inner(), &user).await {
        Ok(qr) => Ok(success_response(QrResponse::from(qr))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// PATCH /api/qr/{id}
pub async fn update_qr(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
    payload: web::Json<UpdateQrPayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let payload = payload.into_inner();

    // 双层 Option 里的时间串要先解析
    let expires_at = match payload.expires_at {
        None => None,
        Some(None) => Some(None),
        Some(Some(value)) => match parse_rfc3339(&value) {
            Ok(dt) => Some(Some(dt)),
            Err(e) => return Ok(error_response(&e)),
        },
    };

    let service = qr_service(&storage, &cache);
    let result = service
        .update_qr(
            &path.into_inner(),
            &user,
            UpdateQrRequest {
                name: payload.name,
                is_active: payload.is_active,
                expires_at,
                scan_limit: payload.scan_limit,
                foreground_color: payload.foreground_color,
                background_color: payload.background_color,
                gradient: payload.gradient,
                eye_shape: payload.eye_shape,
                module_style: payload.module_style,
                logo_data: payload.logo_data,
            },
        )
        .await;

    match result {
        Ok(qr) => Ok(success_response(QrResponse::from(qr))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// PATCH /api/qr/{id}/destination - 动态码改向，短码和已印出的图不变
pub async fn update_destination(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
    payload: web::Json<UpdateDestinationPayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = qr_service(&storage, &cache);
    match service
        .update_destination(&path.into_inner(), &user, &payload.data)
        .await
    {
        Ok(qr) => Ok(success_response(QrResponse::from(qr))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// DELETE /api/qr/{id}
pub async fn delete_qr(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = qr_service(&storage, &cache);
    match service.delete_qr(&path.into_inner(), &user).await {
        Ok(()) => Ok(success_response(serde_json::json!({
            "message": "QR code deleted"
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/qr/preview - 未认证，限流 5/min/IP
///
/// 生成一个 `preview-` 前缀的一次性短码，SVG 按传入的设计渲染，
/// 短码只进缓存不落库，到 TTL 自动消失。
pub async fn preview_qr(
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    payload: web::Json<PreviewPayload>,
) -> ActixResult<impl Responder> {
    let payload = payload.into_inner();

    if payload.data.trim().is_empty() {
        return Ok(error_response(&QrifyError::validation(
            "data cannot be empty",
        )));
    }

    let code = format!(
        "{}{}",
        PREVIEW_PREFIX,
        generate_random_code(PREVIEW_CODE_LENGTH)
    );
    let now = chrono::Utc::now();
    let qr = QrCode {
        id: code.clone(),
        user_id: String::new(),
        name: "preview".to_string(),
        qr_type: payload.qr_type.to_string(),
        original_data: payload.data.trim().to_string(),
        short_code: code.clone(),
        is_dynamic: false,
        is_active: true,
        expires_at: None,
        scan_limit: None,
        scan_count: 0,
        foreground_color: payload
            .foreground_color
            .unwrap_or_else(|| "#000000".to_string()),
        background_color: payload
            .background_color
            .unwrap_or_else(|| "#ffffff".to_string()),
        gradient: payload.gradient,
        eye_shape: payload.eye_shape.unwrap_or_else(|| "square".to_string()),
        module_style: payload.module_style.unwrap_or_else(|| "square".to_string()),
        logo_data: payload.logo_data,
        created_at: now,
        updated_at: now,
    };

    let design = QrDesign::from(&qr);
    let svg = match render_qr_svg(&QrService::short_url(&code), &design) {
        Ok(svg) => svg,
        Err(e) => return Ok(error_response(&e)),
    };

    cache.insert(code.clone(), qr).await;

    Ok(success_response(serde_json::json!({
        "preview_code": code,
        "short_url": QrService::short_url(&code),
        "svg": svg,
    })))
}

/// GET /api/qr/{id}/embed - 公开的嵌入信息
pub async fn embed_info(
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let service = qr_service(&storage, &cache);
    match service.embed_info(&path.into_inner()).await {
        Ok(info) => Ok(success_response(EmbedResponse {
            name: info.name,
            short_url: info.short_url,
            image_url: info.image_url,
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/qr/logo - multipart 上传，白名单 + 2 MiB 上限，返回 data URI
pub async fn upload_logo(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    mut multipart: Multipart,
) -> ActixResult<impl Responder> {
    if let Err(e) = current_user(&req, storage.get_ref()).await {
        return Ok(error_response(&e));
    }

    let mut field = match multipart.try_next().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return Ok(error_response(&QrifyError::validation(
                "multipart body contains no file",
            )));
        }
        Err(e) => {
            return Ok(error_response(&QrifyError::validation(format!(
                "invalid multipart body: {}",
                e
            ))));
        }
    };

    let content_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_default();
    if !ALLOWED_LOGO_TYPES.contains(&content_type.as_str()) {
        warn!("QR API: rejected logo upload with content type '{}'", content_type);
        return Ok(error_response(&QrifyError::validation(
            "unsupported logo format; use PNG, JPEG, SVG or WebP",
        )));
    }

    let mut data: Vec<u8> = Vec::new();
    loop {
        match field.try_next().await {
            Ok(Some(chunk)) => {
                if data.len() + chunk.len() > MAX_LOGO_BYTES {
                    return Ok(json_response::<()>(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        ErrorCode::FileTooLarge,
                        "logo exceeds the 2 MiB limit",
                        None,
                    ));
                }
                data.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                return Ok(error_response(&QrifyError::validation(format!(
                    "upload failed: {}",
                    e
                ))));
            }
        }
    }

    if data.is_empty() {
        return Ok(error_response(&QrifyError::validation("empty logo file")));
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
    let logo_data = format!("data:{};base64,{}", content_type, encoded);

    Ok(success_response(LogoUploadResponse {
        logo_data,
        content_type,
        size_bytes: data.len() as u64,
    }))
}

/// GET /i/{code}.svg - 按存储的设计即时渲染，长缓存
pub async fn render_image(
    storage: web::Data<Arc<SeaOrmStorage>>,
    cache: web::Data<Arc<dyn CompositeCacheTrait>>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let raw = path.into_inner();
    let code = raw.strip_suffix(".svg").unwrap_or(&raw);

    // 预览码不从这里出图
    if code.is_empty() || code.starts_with(PREVIEW_PREFIX) {
        return Ok(HttpResponse::NotFound()
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found"));
    }

    let service = qr_service(&storage, &cache);
    match service.render_by_code(code).await {
        Ok(svg) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", "image/svg+xml; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=86400"))
            .body(svg)),
        Err(QrifyError::NotFound(_)) => Ok(HttpResponse::NotFound()
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 认证后的 QR 管理路由（/api/qr）
pub fn qr_routes() -> actix_web::Scope {
    web::scope("/api/qr")
        .route("", web::post().to(create_qr))
        .route("", web::get().to(list_qrs))
        .route("/logo", web::post().to(upload_logo))
        .route("/{id}", web::get().to(get_qr))
        .route("/{id}", web::patch().to(update_qr))
        .route("/{id}", web::delete().to(delete_qr))
        .route("/{id}/destination", web::patch().to(update_destination))
        .route("/{id}/stats", web::get().to(super::stats::qr_stats))
}

/// 公开 QR 端点：preview（限流）+ embed
///
/// 精确路径的 resource，必须注册在认证 scope 之前，否则会被
/// `/api/qr` scope 整个吞掉。
pub fn qr_public_routes() -> impl actix_web::dev::HttpServiceFactory {
    (
        web::resource("/api/qr/preview")
            .wrap(preview_rate_limiter())
            .route(web::post().to(preview_qr)),
        web::resource("/api/qr/{id}/embed").route(web::get().to(embed_info)),
    )
}

/// 图片路由（/i/{code}.svg）
pub fn image_routes() -> actix_web::Scope {
    web::scope("/i").route("/{code}", web::get().to(render_image))
}
