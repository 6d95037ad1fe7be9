//! 账单端点：套餐表、下单、Razorpay webhook、订阅历史
//!
//! webhook 用 `web::Bytes` 拿原始 body——签名必须盖在未解析的字节上。

use actix_web::{HttpRequest, HttpResponse, Responder, Result as ActixResult, web};
use std::sync::Arc;
use tracing::warn;

use crate::api::types::{CreateOrderPayload, SubscriptionResponse, error_response};
use crate::services::BillingService;
use crate::storage::SeaOrmStorage;

use super::helpers::{current_user, success_response};

/// GET /api/billing/plans - 公开定价表
pub async fn plans() -> ActixResult<impl Responder> {
    Ok(success_response(BillingService::plans()))
}

/// POST /api/billing/orders
pub async fn create_order(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    payload: web::Json<CreateOrderPayload>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = BillingService::new(storage.get_ref().clone());
    match service.create_order(&user, payload.plan).await {
        Ok(order) => Ok(success_response(order)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/billing/subscriptions - 当前用户订阅历史
pub async fn list_subscriptions(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    let user = match current_user(&req, storage.get_ref()).await {
        Ok(user) => user,
        Err(e) => return Ok(error_response(&e)),
    };

    let service = BillingService::new(storage.get_ref().clone());
    match service.list_subscriptions(&user.id).await {
        Ok(subs) => {
            let subs: Vec<SubscriptionResponse> =
                subs.into_iter().map(SubscriptionResponse::from).collect();
            Ok(success_response(subs))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/billing/webhook/razorpay - 未认证，签名即认证
pub async fn razorpay_webhook(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
    body: web::Bytes,
) -> ActixResult<impl Responder> {
    let Some(signature) = req
        .headers()
        .get("x-razorpay-signature")
        .and_then(|h| h.to_str().ok())
    else {
        warn!("Billing: webhook without signature header");
        return Ok(HttpResponse::BadRequest().json(crate::api::types::ApiResponse::<()>::error(
            crate::api::types::ErrorCode::WebhookSignatureInvalid,
            "missing x-razorpay-signature header",
        )));
    };

    let service = BillingService::new(storage.get_ref().clone());
    match service.handle_webhook(&body, signature).await {
        Ok(outcome) => Ok(success_response(serde_json::json!({ "status": outcome }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 公开账单端点：定价表 + webhook
///
/// 精确路径的 resource，注册在认证 scope 之前。
pub fn billing_public_routes() -> impl actix_web::dev::HttpServiceFactory {
    (
        web::resource("/api/billing/plans").route(web::get().to(plans)),
        web::resource("/api/billing/webhook/razorpay").route(web::post().to(razorpay_webhook)),
    )
}

/// 认证后的账单路由
pub fn billing_routes() -> actix_web::Scope {
    web::scope("/api/billing")
        .route("/orders", web::post().to(create_order))
        .route("/subscriptions", web::get().to(list_subscriptions))
}
