//! Razorpay webhook 端到端：签名校验、激活、重放、失败路径
//!
//! webhook secret 是进程级配置，单独一个测试二进制。

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tempfile::TempDir;
use uuid::Uuid;

use qrify::api::services::billing_public_routes;
use qrify::config::{StaticConfig, replace_config};
use qrify::services::{RegisterRequest, UserService};
use qrify::storage::{
    PlanTier, SeaOrmStorage, StorageFactory, Subscription, SubscriptionStatus, User,
};

const WEBHOOK_SECRET: &str = "whsec_test";

static TEST_DIR: std::sync::OnceLock<TempDir> = std::sync::OnceLock::new();
static STORAGE: std::sync::OnceLock<Arc<SeaOrmStorage>> = std::sync::OnceLock::new();
static INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn init_test_env() {
    INIT.get_or_init(|| async {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("billing_webhook_test.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.auth.jwt_secret = "billing-test-secret-billing-test-secret!!".to_string();
        config.auth.cookie_secure = false;
        config.billing.razorpay_webhook_secret = WEBHOOK_SECRET.to_string();
        replace_config(config);

        let storage = StorageFactory::create()
            .await
            .expect("Failed to create storage");
        let _ = STORAGE.set(storage);
        let _ = TEST_DIR.set(temp_dir);
    })
    .await;
}

fn get_storage() -> Arc<SeaOrmStorage> {
    STORAGE.get().expect("Storage not initialized").clone()
}

macro_rules! webhook_app {
    () => {{
        test::init_service(
            App::new()
                .app_data(web::Data::new(get_storage()))
                .service(billing_public_routes()),
        )
        .await
    }};
}

/// Razorpay 对 raw body 的 HMAC-SHA256 十六进制签名
fn sign(body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key failed");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn create_user(email: &str) -> User {
    UserService::new(get_storage())
        .register(RegisterRequest {
            email: email.to_string(),
            password: "hunter22".to_string(),
            name: None,
        })
        .await
        .expect("registration failed")
}

/// 插入一条 create_order 会留下的 Pending 订阅行
async fn insert_pending_subscription(user: &User, order_id: &str, plan: PlanTier) -> Subscription {
    let now = Utc::now();
    let sub = Subscription {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        plan,
        amount: plan.price_inr() as i64,
        currency: "INR".to_string(),
        provider: "razorpay".to_string(),
        provider_order_id: Some(order_id.to_string()),
        provider_payment_id: None,
        status: SubscriptionStatus::Pending,
        start_date: now,
        end_date: None,
        created_at: now,
    };
    get_storage()
        .insert_subscription(&sub)
        .await
        .expect("insert subscription failed");
    sub
}

fn captured_body(order_id: &str, plan: &str) -> String {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": format!("pay_{}", &order_id[6..]),
                    "order_id": order_id,
                    "notes": { "plan": plan }
                }
            }
        }
    })
    .to_string()
}

// =============================================================================
// Webhook Tests
// =============================================================================

#[actix_rt::test]
async fn test_captured_webhook_activates_and_upgrades() {
    init_test_env().await;
    let user = create_user("payer@example.com").await;
    assert_eq!(user.plan, PlanTier::Free);
    insert_pending_subscription(&user, "order_paid001", PlanTier::Pro).await;

    let app = webhook_app!();
    let body = captured_body("order_paid001", "pro");

    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("x-razorpay-signature", sign(&body)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["data"]["status"], "activated");

    // 订阅激活 + 用户升级
    let sub = get_storage()
        .get_subscription_by_order_id("order_paid001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.end_date.is_some());
    assert_eq!(sub.provider_payment_id.as_deref(), Some("pay_paid001"));

    let user = get_storage().get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(user.plan, PlanTier::Pro);
}

#[actix_rt::test]
async fn test_webhook_replay_is_idempotent() {
    init_test_env().await;
    let user = create_user("replay@example.com").await;
    insert_pending_subscription(&user, "order_replay01", PlanTier::Pro).await;

    let app = webhook_app!();
    let body = captured_body("order_replay01", "pro");
    let signature = sign(&body);

    for expected in ["activated", "already active"] {
        let req = TestRequest::post()
            .uri("/api/billing/webhook/razorpay")
            .insert_header(("x-razorpay-signature", signature.clone()))
            .insert_header(("Content-Type", "application/json"))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["data"]["status"], expected);
    }
}

#[actix_rt::test]
async fn test_webhook_missing_signature_header() {
    init_test_env().await;
    let app = webhook_app!();

    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(captured_body("order_nosig001", "pro"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_webhook_invalid_signature() {
    init_test_env().await;
    let user = create_user("forged@example.com").await;
    insert_pending_subscription(&user, "order_forged01", PlanTier::Pro).await;

    let app = webhook_app!();
    let body = captured_body("order_forged01", "pro");

    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("x-razorpay-signature", "deadbeef"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // 签名不过，订阅不能动
    let sub = get_storage()
        .get_subscription_by_order_id("order_forged01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Pending);
}

#[actix_rt::test]
async fn test_failed_webhook_marks_subscription() {
    init_test_env().await;
    let user = create_user("declined@example.com").await;
    insert_pending_subscription(&user, "order_fail0001", PlanTier::Pro).await;

    let app = webhook_app!();
    let body = serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_fail0001",
                    "order_id": "order_fail0001"
                }
            }
        }
    })
    .to_string();

    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("x-razorpay-signature", sign(&body)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["data"]["status"], "failed");

    // 付款失败不升级用户
    let sub = get_storage()
        .get_subscription_by_order_id("order_fail0001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Failed);
    let user = get_storage().get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(user.plan, PlanTier::Free);
}

#[actix_rt::test]
async fn test_unknown_event_is_acknowledged() {
    init_test_env().await;
    let app = webhook_app!();

    let body = serde_json::json!({ "event": "order.paid", "payload": {} }).to_string();

    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("x-razorpay-signature", sign(&body)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["data"]["status"], "ignored");
}

#[actix_rt::test]
async fn test_webhook_for_unknown_order() {
    init_test_env().await;
    let app = webhook_app!();

    let body = captured_body("order_missing01", "pro");
    let req = TestRequest::post()
        .uri("/api/billing/webhook/razorpay")
        .insert_header(("x-razorpay-signature", sign(&body)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_public_plans_endpoint() {
    init_test_env().await;
    let app = webhook_app!();

    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/api/billing/plans").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: serde_json::Value = test::read_body_json(resp).await;
    let plans = json["data"].as_array().unwrap();
    assert_eq!(plans.len(), 3);
    assert_eq!(plans[1]["plan"], "pro");
    assert_eq!(plans[1]["price"], 499);
}
