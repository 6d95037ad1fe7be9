//! 管理端点（/api/admin，AdminGate 保护）

use actix_web::{HttpResponse, Responder, Result as ActixResult, web};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::api::types::{
    AdminQrRow, AdminUpdateUserPayload, ErrorCode, GetQrsQuery, GetUsersQuery, PaginatedResponse,
    PaginationInfo, PurgeResponse, QrResponse, UserResponse, error_response,
};
use crate::errors::QrifyError;
use crate::storage::{QrFilter, SeaOrmStorage, UserFilter};

use super::helpers::success_response;

/// GET /api/admin/users
pub async fn list_users(
    storage: web::Data<Arc<SeaOrmStorage>>,
    query: web::Query<GetUsersQuery>,
) -> ActixResult<impl Responder> {
    let query = query.into_inner();
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

    let filter = UserFilter {
        search: query.search,
        plan: query.plan,
        only_active: query.only_active.unwrap_or(false),
    };

    let (users, total) = storage.list_users_paginated(page, page_size, filter).await;
    // UserResponse 不携带 password_hash
    let data: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        code: ErrorCode::Success as i32,
        message: "ok".to_string(),
        data,
        pagination: PaginationInfo::new(page, page_size, total),
    }))
}

/// PATCH /api/admin/users/{id} - 改角色 / 套餐 / 启停
pub async fn update_user(
    storage: web::Data<Arc<SeaOrmStorage>>,
    path: web::Path<String>,
    payload: web::Json<AdminUpdateUserPayload>,
) -> ActixResult<impl Responder> {
    let user_id = path.into_inner();
    let payload = payload.into_inner();

    let mut user = match storage.get_user_by_id(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Ok(error_response(&QrifyError::not_found("user not found")));
        }
        Err(e) => return Ok(error_response(&e)),
    };

    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(plan) = payload.plan {
        user.plan = plan;
    }
    if let Some(active) = payload.is_active {
        user.is_active = active;
    }
    user.updated_at = Utc::now();

    if let Err(e) = storage.update_user(&user).await {
        return Ok(error_response(&e));
    }

    info!("Admin: updated user {}", user.id);
    Ok(success_response(UserResponse::from(user)))
}

/// GET /api/admin/qrs - 全量码表，附带所有者邮箱
pub async fn list_qrs(
    storage: web::Data<Arc<SeaOrmStorage>>,
    query: web::Query<GetQrsQuery>,
) -> ActixResult<impl Responder> {
    let query = query.into_inner();
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

    let filter = QrFilter {
        search: query.search,
        user_id: None,
        only_active: query.only_active.unwrap_or(false),
        qr_type: query.qr_type,
    };

    let (qrs, total) = storage.list_qrs_paginated(page, page_size, filter).await;

    let owner_ids: Vec<String> = qrs.iter().map(|qr| qr.user_id.clone()).collect();
    let emails = match storage.get_user_emails(&owner_ids).await {
        Ok(emails) => emails,
        Err(e) => return Ok(error_response(&e)),
    };

    let data: Vec<AdminQrRow> = qrs
        .into_iter()
        .map(|qr| {
            let owner_email = emails.get(&qr.user_id).cloned();
            AdminQrRow {
                qr: QrResponse::from(qr),
                owner_email,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        code: ErrorCode::Success as i32,
        message: "ok".to_string(),
        data,
        pagination: PaginationInfo::new(page, page_size, total),
    }))
}

/// GET /api/admin/qrs/export - 全量 CSV 下载
pub async fn export_qrs(storage: web::Data<Arc<SeaOrmStorage>>) -> ActixResult<impl Responder> {
    let qrs = storage.load_qrs_filtered(QrFilter::default()).await;

    let owner_ids: Vec<String> = qrs.iter().map(|qr| qr.user_id.clone()).collect();
    let emails = match storage.get_user_emails(&owner_ids).await {
        Ok(emails) => emails,
        Err(e) => return Ok(error_response(&e)),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Err(e) = writer.write_record([
        "id",
        "name",
        "qr_type",
        "short_code",
        "destination",
        "owner_email",
        "is_dynamic",
        "is_active",
        "scan_count",
        "created_at",
    ]) {
        return Ok(error_response(&QrifyError::serialization(e.to_string())));
    }

    for qr in &qrs {
        let scan_count = qr.scan_count.to_string();
        let created_at = qr.created_at.to_rfc3339();
        let record = [
            qr.id.as_str(),
            qr.name.as_str(),
            qr.qr_type.as_str(),
            qr.short_code.as_str(),
            qr.original_data.as_str(),
            emails.get(&qr.user_id).map(String::as_str).unwrap_or(""),
            if qr.is_dynamic { "true" } else { "false" },
            if qr.is_active { "true" } else { "false" },
            scan_count.as_str(),
            created_at.as_str(),
        ];
        if let Err(e) = writer.write_record(record) {
            return Ok(error_response(&QrifyError::serialization(e.to_string())));
        }
    }

    let bytes = match writer.into_inner() {
        Ok(bytes) => bytes,
        Err(e) => return Ok(error_response(&QrifyError::serialization(e.to_string()))),
    };

    info!("Admin: exported {} QR codes as CSV", qrs.len());
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/csv; charset=utf-8"))
        .insert_header((
            "Content-Disposition",
            "attachment; filename=\"qr-codes.csv\"",
        ))
        .body(bytes))
}

/// POST /api/admin/qrs/purge-invalid - 清除短码或目标为空的脏数据
pub async fn purge_invalid(storage: web::Data<Arc<SeaOrmStorage>>) -> ActixResult<impl Responder> {
    match storage.purge_invalid_qrs().await {
        Ok(purged) => {
            info!("Admin: purged {} invalid QR rows", purged);
            Ok(success_response(PurgeResponse { purged }))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// 管理路由（/api/admin）
pub fn admin_routes() -> actix_web::Scope {
    web::scope("/api/admin")
        .route("/users", web::get().to(list_users))
        .route("/users/{id}", web::patch().to(update_user))
        .route("/qrs", web::get().to(list_qrs))
        .route("/qrs/export", web::get().to(export_qrs))
        .route("/qrs/purge-invalid", web::post().to(purge_invalid))
}
