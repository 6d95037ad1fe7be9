//! 统计端点：单码分析 + 用户 dashboard 总览

use actix_web::{HttpRequest, Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::api::types::error_response;
use crate::services::StatsService;
use crate::storage::SeaOrmStorage;

use super::helpers::{current_user, success_response};

/// GET /api/qr/{id}/stats
pub async fn qr_stats(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = StatsService::new(storage.get_ref().clone());
    match service.qr_stats(&path.into_inner(), &user).await {
        Ok(stats) => Ok(success_response(stats)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/dashboard/overview
pub async fn dashboard_overview(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = StatsService::new(storage.get_ref().clone());
    match service.dashboard_overview(&user.id).await {
        Ok(overview) => Ok(success_response(overview)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 统计路由（须已认证）
///
/// `/api/qr/{id}/stats` 挂在 qr scope 下面注册，这里只有 dashboard。
pub fn dashboard_routes() -> actix_web::Scope {
    web::scope("/api/dashboard").route("/overview", web::get().to(dashboard_overview))
}
