//! 用户自助端点：资料、改密、注销、数据导出

use actix_web::{HttpRequest, HttpResponse, Responder, Result as ActixResult, web};
use std::sync::Arc;
use tracing::info;

use crate::api::types::{ChangePasswordPayload, UpdateProfilePayload, UserResponse, error_response};
use crate::services::{UpdateProfileRequest, UserService};
use crate::storage::SeaOrmStorage;

use super::helpers::{CookieBuilder, current_user, success_response};

/// GET /api/user/profile
pub async fn get_profile(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    match current_user(&req, storage.get_ref()).await {
        Ok(user) => Ok(success_response(UserResponse::from(user))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// PATCH /api/user/profile
pub async fn update_profile(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    payload: web::Json<UpdateProfilePayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = UserService::new(storage.get_ref().clone());
    let payload = payload.into_inner();
    let result = service
        .update_profile(
            &user.id,
            UpdateProfileRequest {
                name: payload.name,
                email: payload.email,
            },
        )
        .await;

    match result {
        Ok(updated) => Ok(success_response(UserResponse::from(updated))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/user/change-password
pub async fn change_password(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    payload: web::Json<ChangePasswordPayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = UserService::new(storage.get_ref().clone());
    let payload = payload.into_inner();
    let result = service
        .change_password(&user.id, &payload.current_password, &payload.new_password)
        .await;

    match result {
        Ok(()) => {
            info!("Account: password changed for user {}", user.id);
            Ok(success_response(serde_json::json!({
                "message": "password changed"
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// DELETE /api/user/account
///
/// 级联删除后顺带清掉三个登录 cookie。
pub async fn delete_account(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = UserService::new(storage.get_ref().clone());
    if let Err(e) = service.delete_account(&user.id).await {
        return Ok(error_response(&e));
    }

    info!("Account: deleted account {}", user.id);

    let cookie_builder = CookieBuilder::from_config();
    Ok(HttpResponse::Ok()
        .cookie(cookie_builder.build_expired_access_cookie())
        .cookie(cookie_builder.build_expired_refresh_cookie())
        .cookie(cookie_builder.build_expired_csrf_cookie())
        .json(crate::api::types::ApiResponse::ok(serde_json::json!({
            "message": "account deleted"
        }))))
}

/// GET /api/user/export - 个人数据一次性导出为 JSON
pub async fn export_account(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = UserService::new(storage.get_ref().clone());
    match service.export_account(&user.id).await {
        Ok(export) => Ok(HttpResponse::Ok()
            .insert_header((
                "Content-Disposition",
                "attachment; filename=\"qrify-export.json\"",
            ))
            .json(export)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 用户自助路由（/api/user，须已认证）
pub fn account_routes() -> actix_web::Scope {
    web::scope("/api/user")
        .route("/profile", web::get().to(get_profile))
        .route("/profile", web::patch().to(update_profile))
        .route("/change-password", web::post().to(change_password))
        .route("/account", web::delete().to(delete_account))
        .route("/export", web::get().to(export_account))
}
