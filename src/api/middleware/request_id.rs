//! 请求 ID 中间件
//!
//! 入站请求若带合法 x-request-id（CDN / 反代注入）则沿用，否则生成
//! UUID。ID 挂进 tracing span 并回写响应头，扫码端报障时拿着响应头里
//! 的值就能定位整条日志链路。

use actix_service::{Service, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{
    Error, HttpMessage,
    dev::{ServiceRequest, ServiceResponse},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use tracing::{Instrument, info_span};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
/// 入站 ID 超长按无效处理，重新生成
const MAX_INBOUND_ID_LEN: usize = 64;

/// 本次请求的 ID，handler 可从 extensions 取出附到错误响应里
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// 入站 ID 只收字母数字和 -/_，挡掉日志注入和畸形头
fn acceptable_inbound_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_INBOUND_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
}

/// 沿用入站 ID 或生成新的 UUID v4
fn resolve_request_id(req: &ServiceRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|raw| acceptable_inbound_id(raw))
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Clone, Default)]
pub struct RequestIdMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RequestIdMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
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
        let request_id = resolve_request_id(&req);

        req.extensions_mut().insert(RequestId(request_id.clone()));

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.path(),
        );

        Box::pin(
            async move {
                let mut response = srv.call(req).await?;

                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{self, TestRequest};
    use actix_web::{App, HttpResponse, web};

    #[test]
    fn test_inbound_id_validation() {
        assert!(acceptable_inbound_id("abc-123_DEF"));
        assert!(acceptable_inbound_id(&"a".repeat(64)));

        assert!(!acceptable_inbound_id(""));
        assert!(!acceptable_inbound_id(&"a".repeat(65)));
        // 换行和空格会污染日志行
        assert!(!acceptable_inbound_id("abc\ndef"));
        assert!(!acceptable_inbound_id("abc def"));
    }

    #[actix_web::test]
    async fn test_inbound_id_is_reused() {
        let app = test::init_service(
            App::new()
                .wrap(RequestIdMiddleware)
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = TestRequest::get()
            .uri("/ping")
            .insert_header(("x-request-id", "edge-7f3a"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(
            resp.headers().get("x-request-id").unwrap(),
            "edge-7f3a"
        );
    }

    #[actix_web::test]
    async fn test_generated_id_on_missing_or_bad_header() {
        let app = test::init_service(
            App::new()
                .wrap(RequestIdMiddleware)
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let resp = test::call_service(&app, TestRequest::get().uri("/ping").to_request()).await;
        let generated = resp
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(Uuid::parse_str(&generated).is_ok());

        // 畸形入站 ID 不能原样回显
        let req = TestRequest::get()
            .uri("/ping")
            .insert_header(("x-request-id", "bad id !!"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let echoed = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert_ne!(echoed, "bad id !!");
        assert!(Uuid::parse_str(echoed).is_ok());
    }
}
