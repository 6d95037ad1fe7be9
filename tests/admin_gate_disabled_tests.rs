//! 管理 API 关闭时整个 /api/admin 面不可发现（404，连管理员也是）
//!
//! 配置是进程级的，所以这个场景单独占一个测试二进制。

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use tempfile::TempDir;

use qrify::api::jwt::get_jwt_service;
use qrify::api::middleware::{AdminGate, CsrfGuard, RequireAuth};
use qrify::api::services::admin_routes;
use qrify::config::{StaticConfig, replace_config};
use qrify::services::UserService;
use qrify::storage::{SeaOrmStorage, StorageFactory, User};

static TEST_DIR: std::sync::OnceLock<TempDir> = std::sync::OnceLock::new();
static STORAGE: std::sync::OnceLock<Arc<SeaOrmStorage>> = std::sync::OnceLock::new();
static INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn init_test_env() {
    INIT.get_or_init(|| async {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("admin_disabled_test.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.auth.jwt_secret = "admin-disabled-secret-admin-disabled-secret".to_string();
        config.auth.cookie_secure = false;
        config.auth.enable_admin_api = false;
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

async fn create_admin() -> User {
    UserService::new(get_storage())
        .create_admin("root@example.com", "hunter22")
        .await
        .expect("admin creation failed")
}

macro_rules! admin_app {
    () => {{
        test::init_service(
            App::new().app_data(web::Data::new(get_storage())).service(
                admin_routes()
                    .wrap(AdminGate)
                    .wrap(CsrfGuard)
                    .wrap(RequireAuth),
            ),
        )
        .await
    }};
}

#[actix_rt::test]
async fn test_disabled_admin_api_is_404_even_for_admins() {
    init_test_env().await;
    let admin = create_admin().await;
    let token = get_jwt_service()
        .generate_access_token(&admin.id, admin.role)
        .expect("token generation failed");
    let app = admin_app!();

    let req = TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "text/plain; charset=utf-8"
    );

    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"Not Found");
}

#[actix_rt::test]
async fn test_disabled_admin_api_is_404_without_credentials() {
    init_test_env().await;
    let app = admin_app!();

    // RequireAuth 在最外层，无凭证先吃 401；有凭证才走到 AdminGate 的 404
    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/api/admin/users").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
