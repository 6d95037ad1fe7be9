use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{Method, header::CONTENT_TYPE},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use tracing::{debug, info, trace};

use crate::api::constants;
use crate::api::jwt::get_jwt_service;
use crate::api::types::{ApiResponse, ErrorCode};
use crate::config::get_config;
use crate::storage::Role;

/// 认证方式标记，用于 CSRF 中间件判断是否跳过验证
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// Bearer Token 认证（API 用户，免 CSRF）
    Bearer,
    /// Cookie 认证（Web Panel，需要 CSRF 防护）
    Cookie,
}

/// 认证后的请求上下文，handler 通过 extensions 读取
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
    /// token 本身的过期时间戳（claims.exp）
    pub exp: i64,
}

/// Authenticated-user middleware
///
/// Accepts a Bearer access token first, then the access cookie. On success
/// the [`AuthContext`] and [`AuthMethod`] are inserted into the request
/// extensions for handlers and the CSRF guard.
#[derive(Clone)]
pub struct RequireAuth;

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    /// Handle OPTIONS requests for CORS preflight
    fn handle_options_request(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        req.into_response(
            HttpResponse::NoContent()
                .insert_header((CONTENT_TYPE, "text/plain; charset=utf-8"))
                .finish()
                .map_into_right_body(),
        )
    }

    /// Handle unauthorized requests
    fn handle_unauthorized(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        info!("Authentication failed - invalid or missing token");
        req.into_response(
            HttpResponse::Unauthorized()
                .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
                .json(ApiResponse::<()>::error(
                    ErrorCode::AuthFailed,
                    "Unauthorized: invalid or missing token",
                ))
                .map_into_right_body(),
        )
    }

    /// 从 Authorization header 提取 Bearer token
    fn extract_bearer_token(req: &ServiceRequest) -> Option<String> {
        req.headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    }

    /// 验证 token 并构造 AuthContext
    fn validate_token(token: &str) -> Option<AuthContext> {
        let jwt_service = get_jwt_service();
        match jwt_service.validate_access_token(token) {
            Ok(claims) => {
                trace!("Access token validation successful");
                Some(AuthContext {
                    user_id: claims.sub,
                    role: claims.role,
                    exp: claims.exp,
                })
            }
            Err(e) => {
                info!("Access token validation failed: {}", e);
                None
            }
        }
    }

    /// 从 Cookie 提取 access token
    fn extract_cookie_token(req: &ServiceRequest) -> Option<String> {
        req.cookie(constants::ACCESS_COOKIE_NAME)
            .map(|c| c.value().to_string())
    }
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        Box::pin(async move {
            // Handle CORS preflight requests
            if req.method() == Method::OPTIONS {
                return Ok(Self::handle_options_request(req));
            }

            // 1. 先尝试 Bearer Token 认证（API 用户，免 CSRF）
            if let Some(token) = Self::extract_bearer_token(&req) {
                if let Some(ctx) = Self::validate_token(&token) {
                    trace!("Authentication successful via Bearer token");
                    req.extensions_mut().insert(AuthMethod::Bearer);
                    req.extensions_mut().insert(ctx);
                    let response = srv.call(req).await?.map_into_left_body();
                    return Ok(response);
                }
                // 携带了 Bearer 但无效则直接拒绝，不再回退 Cookie
                return Ok(Self::handle_unauthorized(req));
            }

            // 2. 再尝试 Cookie 认证（Web Panel，需要 CSRF 防护）
            if let Some(token) = Self::extract_cookie_token(&req)
                && let Some(ctx) = Self::validate_token(&token)
            {
                trace!("Authentication successful via access cookie");
                req.extensions_mut().insert(AuthMethod::Cookie);
                req.extensions_mut().insert(ctx);
                let response = srv.call(req).await?.map_into_left_body();
                return Ok(response);
            }

            Ok(Self::handle_unauthorized(req))
        })
    }
}

/// Admin-only gate, layered inside [`RequireAuth`]
///
/// Requires `role == Admin`. When the admin API is disabled by config the
/// whole scope answers plain 404 so the surface is not discoverable.
#[derive(Clone)]
pub struct AdminGate;

impl<S, B> Transform<S, ServiceRequest> for AdminGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AdminGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminGateMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct AdminGateMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> AdminGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    fn handle_disabled(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        debug!("Admin API disabled - returning 404");
        req.into_response(
            HttpResponse::NotFound()
                .insert_header((CONTENT_TYPE, "text/plain; charset=utf-8"))
                .body("Not Found")
                .map_into_right_body(),
        )
    }

    fn handle_forbidden(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        info!("Admin access denied for non-admin user");
        req.into_response(
            HttpResponse::Forbidden()
                .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
                .json(ApiResponse::<()>::error(
                    ErrorCode::Forbidden,
                    "Forbidden: admin access required",
                ))
                .map_into_right_body(),
        )
    }
}

impl<S, B> Service<ServiceRequest> for AdminGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        Box::pin(async move {
            if !get_config().auth.enable_admin_api {
                return Ok(Self::handle_disabled(req));
            }

            let is_admin = req
                .extensions()
                .get::<AuthContext>()
                .is_some_and(|ctx| ctx.role == Role::Admin);

            if !is_admin {
                return Ok(Self::handle_forbidden(req));
            }

            let response = srv.call(req).await?.map_into_left_body();
            Ok(response)
        })
    }
}
