//! 认证端点：注册、登录、刷新、登出、校验
//!
//! 登录成功同时下发三个 cookie（access / refresh / csrf），响应体里也带
//! access token 供 Bearer 客户端使用。

use actix_web::{HttpMessage, HttpRequest, HttpResponse, Responder, Result as ActixResult, web};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::constants;
use crate::api::jwt::get_jwt_service;
use crate::api::middleware::AuthContext;
use crate::api::types::{
    ApiResponse, ErrorCode, LoginPayload, LoginResponse, RegisterPayload, UserResponse,
    VerifyResponse, error_response,
};
use crate::errors::QrifyError;
use crate::services::{RegisterRequest, UserService};
use crate::storage::SeaOrmStorage;

use super::helpers::{
    CookieBuilder, generate_csrf_token, json_response, login_rate_limiter, success_response,
};

fn token_error() -> HttpResponse {
    json_response::<()>(
        actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::InternalServerError,
        "failed to generate token",
        None,
    )
}

/// POST /api/auth/register
pub async fn register(
    storage: web::Data<Arc<SeaOrmStorage>>,
    payload: web::Json<RegisterPayload>,
) -> ActixResult<impl Responder> {
    let service = UserService::new(storage.get_ref().clone());
    let payload = payload.into_inner();

    let result = service
        .register(RegisterRequest {
            email: payload.email,
            password: payload.password,
            name: payload.name,
        })
        .await;

    match result {
        Ok(user) => {
            info!("Auth: registered new account {}", user.email);
            Ok(success_response(UserResponse::from(user)))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/auth/login
pub async fn login(
    storage: web::Data<Arc<SeaOrmStorage>>,
    payload: web::Json<LoginPayload>,
) -> ActixResult<impl Responder> {
    let service = UserService::new(storage.get_ref().clone());
    let payload = payload.into_inner();

    let user = match service.authenticate(&payload.email, &payload.password).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Auth: login failed for {}", payload.email);
            return Ok(error_response(&e));
        }
    };

    let jwt_service = get_jwt_service();
    let access_token = match jwt_service.generate_access_token(&user.id, user.role) {
        Ok(token) => token,
        Err(e) => {
            error!("Auth: failed to generate access token: {}", e);
            return Ok(token_error());
        }
    };
    let refresh_token = match jwt_service.generate_refresh_token(&user.id) {
        Ok(token) => token,
        Err(e) => {
            error!("Auth: failed to generate refresh token: {}", e);
            return Ok(token_error());
        }
    };

    info!("Auth: login successful for user {}", user.id);

    let cookie_builder = CookieBuilder::from_config();
    let access_cookie = cookie_builder.build_access_cookie(access_token.clone());
    let refresh_cookie = cookie_builder.build_refresh_cookie(refresh_token);
    let csrf_cookie = cookie_builder.build_csrf_cookie(generate_csrf_token());

    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .cookie(csrf_cookie)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse::ok(LoginResponse {
            access_token,
            user: UserResponse::from(user),
        })))
}

/// POST /api/auth/refresh
///
/// 滑动续期：验证 refresh cookie 后重发全部三个 cookie。
pub async fn refresh(
    req: HttpRequest,
    storage: web::Data<Arc<SeaOrmStorage>>,
) -> ActixResult<impl Responder> {
    let refresh_token = match req.cookie(constants::REFRESH_COOKIE_NAME) {
        Some(cookie) => cookie.value().to_string(),
        None => {
            warn!("Auth: refresh token not found in cookie");
            return Ok(error_response(&QrifyError::unauthorized(
                "refresh token not found",
            )));
        }
    };

    let jwt_service = get_jwt_service();
    let claims = match jwt_service.validate_refresh_token(&refresh_token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Auth: invalid refresh token: {}", e);
            return Ok(error_response(&QrifyError::unauthorized(
                "invalid refresh token",
            )));
        }
    };

    // 重新读用户：角色变更或封禁在下一次刷新生效
    let user = match storage.get_user_by_id(&claims.sub).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => {
            warn!("Auth: refresh rejected for inactive or missing user {}", claims.sub);
            return Ok(error_response(&QrifyError::unauthorized(
                "account is no longer active",
            )));
        }
        Err(e) => return Ok(error_response(&e)),
    };

    let new_access = match jwt_service.generate_access_token(&user.id, user.role) {
        Ok(token) => token,
        Err(e) => {
            error!("Auth: failed to generate access token: {}", e);
            return Ok(token_error());
        }
    };
    let new_refresh = match jwt_service.generate_refresh_token(&user.id) {
        Ok(token) => token,
        Err(e) => {
            error!("Auth: failed to generate refresh token: {}", e);
            return Ok(token_error());
        }
    };

    info!("Auth: token refresh successful for user {}", user.id);

    let cookie_builder = CookieBuilder::from_config();
    let access_cookie = cookie_builder.build_access_cookie(new_access.clone());
    let refresh_cookie = cookie_builder.build_refresh_cookie(new_refresh);
    let csrf_cookie = cookie_builder.build_csrf_cookie(generate_csrf_token());

    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .cookie(csrf_cookie)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse::ok(LoginResponse {
            access_token: new_access,
            user: UserResponse::from(user),
        })))
}

/// POST /api/auth/logout
pub async fn logout(_req: HttpRequest) -> ActixResult<impl Responder> {
    info!("Auth: logout");

    let cookie_builder = CookieBuilder::from_config();

    Ok(HttpResponse::Ok()
        .cookie(cookie_builder.build_expired_access_cookie())
        .cookie(cookie_builder.build_expired_refresh_cookie())
        .cookie(cookie_builder.build_expired_csrf_cookie())
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse::ok(serde_json::json!({
            "message": "logout successful"
        }))))
}

/// GET /api/auth/verify - 中间件通过即有效，回显 claims
pub async fn verify(req: HttpRequest) -> ActixResult<impl Responder> {
    let Some(ctx) = req.extensions().get::<AuthContext>().cloned() else {
        return Ok(json_response::<()>(
            actix_web::http::StatusCode::UNAUTHORIZED,
            ErrorCode::AuthFailed,
            "Unauthorized",
            None,
        ));
    };

    Ok(success_response(VerifyResponse {
        user_id: ctx.user_id,
        role: ctx.role,
        // token 自带的 exp，不是 now + TTL（刷新过的 token 两者会差开）
        expires_at: ctx.exp,
    }))
}

/// 认证路由（/api/auth）
///
/// register 和 login 套限流；verify 在外层 RequireAuth scope 里单独挂。
pub fn auth_routes() -> actix_web::Scope {
    web::scope("/api/auth")
        .service(
            web::resource("/register")
                .wrap(login_rate_limiter())
                .route(web::post().to(register)),
        )
        .service(
            web::resource("/login")
                .wrap(login_rate_limiter())
                .route(web::post().to(login)),
        )
        .route("/refresh", web::post().to(refresh))
        .route("/logout", web::post().to(logout))
}
