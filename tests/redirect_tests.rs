//! Redirect hot path tests
//!
//! `/r/{code}` is the one route printed on physical media, so every state
//! transition (active, inactive, expired, limit reached) is covered here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio::sync::RwLock;

use qrify::api::services::redirect::redirect_routes;
use qrify::cache::{CacheResult, CompositeCacheTrait};
use qrify::config::{StaticConfig, replace_config};
use qrify::storage::{QrCode, SeaOrmStorage, StorageFactory};

// =============================================================================
// Test Setup
// =============================================================================

static TEST_DIR: std::sync::OnceLock<TempDir> = std::sync::OnceLock::new();
static STORAGE: std::sync::OnceLock<Arc<SeaOrmStorage>> = std::sync::OnceLock::new();
static INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn init_test_env() {
    INIT.get_or_init(|| async {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("redirect_test.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.auth.jwt_secret = "redirect-test-secret-redirect-test-secret".to_string();
        config.auth.cookie_secure = false;
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

/// Mock cache: map 里有 → Found，标记过 → NotFound，否则 → 回源
struct MockCache {
    data: RwLock<HashMap<String, QrCode>>,
    not_found: RwLock<HashSet<String>>,
}

impl MockCache {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            not_found: RwLock::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl CompositeCacheTrait for MockCache {
    async fn get(&self, key: &str) -> CacheResult {
        if self.not_found.read().await.contains(key) {
            return CacheResult::NotFound;
        }
        match self.data.read().await.get(key) {
            Some(qr) => CacheResult::Found(qr.clone()),
            None => CacheResult::ExistsButNoValue,
        }
    }

    async fn insert(&self, key: String, value: QrCode) {
        self.not_found.write().await.remove(&key);
        self.data.write().await.insert(key, value);
    }

    async fn remove(&self, key: &str) {
        self.data.write().await.remove(key);
    }

    async fn mark_not_found(&self, key: &str) {
        self.not_found.write().await.insert(key.to_string());
    }

    async fn invalidate_all(&self) {
        self.data.write().await.clear();
        self.not_found.write().await.clear();
    }

    async fn load_codes(&self, _codes: &[String]) {}
}

fn test_qr(code: &str, qr_type: &str, data: &str) -> QrCode {
    let now = Utc::now();
    QrCode {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: "owner-1".to_string(),
        name: format!("test {}", code),
        qr_type: qr_type.to_string(),
        original_data: data.to_string(),
        short_code: code.to_string(),
        is_dynamic: true,
        is_active: true,
        expires_at: None,
        scan_limit: None,
        scan_count: 0,
        foreground_color: "#000000".to_string(),
        background_color: "#ffffff".to_string(),
        gradient: None,
        eye_shape: "square".to_string(),
        module_style: "square".to_string(),
        logo_data: None,
        created_at: now,
        updated_at: now,
    }
}

macro_rules! redirect_app {
    ($cache:expr) => {{
        test::init_service(
            App::new()
                .app_data(web::Data::new(
                    $cache.clone() as Arc<dyn CompositeCacheTrait>
                ))
                .app_data(web::Data::new(get_storage()))
                .service(redirect_routes()),
        )
        .await
    }};
}

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get("Location")
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Redirect Tests
// =============================================================================

#[actix_web::test]
async fn test_redirect_from_cache() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let qr = test_qr("cached1", "url", "https://example.com/landing");
    cache.insert("cached1".to_string(), qr).await;

    let app = redirect_app!(cache);
    let req = TestRequest::get().uri("/r/cached1").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "https://example.com/landing");
}

#[actix_web::test]
async fn test_redirect_falls_through_to_db() {
    init_test_env().await;

    let storage = get_storage();
    let qr = test_qr("dbhit1", "url", "https://example.com/fromdb");
    storage.insert_qr(&qr).await.expect("insert failed");

    let cache = Arc::new(MockCache::new());
    let app = redirect_app!(cache);

    let req = TestRequest::get().uri("/r/dbhit1").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "https://example.com/fromdb");

    // 回填缓存
    assert!(matches!(
        cache.get("dbhit1").await,
        CacheResult::Found(_)
    ));
}

#[actix_web::test]
async fn test_redirect_adds_missing_protocol() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache
        .insert(
            "bare1".to_string(),
            test_qr("bare1", "url", "example.com/page"),
        )
        .await;

    let app = redirect_app!(cache);
    let req = TestRequest::get().uri("/r/bare1").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "https://example.com/page");
}

#[actix_web::test]
async fn test_redirect_rewrites_by_type() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache
        .insert(
            "mail1".to_string(),
            test_qr("mail1", "email", "user@example.com"),
        )
        .await;
    cache
        .insert(
            "tel1".to_string(),
            test_qr("tel1", "phone", "+919876543210"),
        )
        .await;
    cache
        .insert(
            "wa1".to_string(),
            test_qr("wa1", "whatsapp", "+91 98765-43210"),
        )
        .await;

    let app = redirect_app!(cache);

    let resp = test::call_service(&app, TestRequest::get().uri("/r/mail1").to_request()).await;
    assert_eq!(location(&resp), "mailto:user@example.com");

    let resp = test::call_service(&app, TestRequest::get().uri("/r/tel1").to_request()).await;
    assert_eq!(location(&resp), "tel:+919876543210");

    let resp = test::call_service(&app, TestRequest::get().uri("/r/wa1").to_request()).await;
    assert_eq!(location(&resp), "https://wa.me/919876543210");
}

#[actix_web::test]
async fn test_redirect_merges_query_params() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache
        .insert(
            "utm1".to_string(),
            test_qr("utm1", "url", "https://example.com/p?utm_source=print"),
        )
        .await;

    let app = redirect_app!(cache);
    let req = TestRequest::get()
        .uri("/r/utm1?ref=poster&utm_source=spoofed")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let target = location(&resp);
    // 目标已有的参数不被请求参数覆盖
    assert!(target.contains("utm_source=print"));
    assert!(!target.contains("utm_source=spoofed"));
    assert!(target.contains("ref=poster"));
}

#[actix_web::test]
async fn test_redirect_inactive_is_forbidden() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("inact1", "url", "https://example.com");
    qr.is_active = false;
    cache.insert("inact1".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(&app, TestRequest::get().uri("/r/inact1").to_request()).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_redirect_expired_is_forbidden() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("exp1", "url", "https://example.com");
    qr.expires_at = Some(Utc::now() - Duration::hours(1));
    cache.insert("exp1".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(&app, TestRequest::get().uri("/r/exp1").to_request()).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_redirect_scan_limit_reached() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("lim1", "url", "https://example.com");
    qr.scan_limit = Some(10);
    qr.scan_count = 10;
    cache.insert("lim1".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(&app, TestRequest::get().uri("/r/lim1").to_request()).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_redirect_empty_destination_is_bad_request() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache
        .insert("empty1".to_string(), test_qr("empty1", "url", "   "))
        .await;

    let app = redirect_app!(cache);
    let resp = test::call_service(&app, TestRequest::get().uri("/r/empty1").to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_redirect_unknown_code_is_cacheable_404() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let app = redirect_app!(cache);

    let resp = test::call_service(&app, TestRequest::get().uri("/r/nOsUcH7").to_request()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        resp.headers().get("Cache-Control").unwrap(),
        "public, max-age=60"
    );

    // 回源确认不存在后进负缓存
    assert!(matches!(cache.get("nOsUcH7").await, CacheResult::NotFound));
}

#[actix_web::test]
async fn test_redirect_negative_cache_short_circuits() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache.mark_not_found("neghit1").await;

    let app = redirect_app!(cache);
    let resp = test::call_service(&app, TestRequest::get().uri("/r/neghit1").to_request()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_redirect_rejects_malformed_codes() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let app = redirect_app!(cache);

    for uri in ["/r/has%20space", "/r/semi;colon", "/r/%20%20"] {
        let resp = test::call_service(&app, TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "uri: {}", uri);
    }
}

#[actix_web::test]
async fn test_redirect_head_request() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    cache
        .insert(
            "head1".to_string(),
            test_qr("head1", "url", "https://example.com/h"),
        )
        .await;

    let app = redirect_app!(cache);
    let req = TestRequest::default()
        .method(actix_web::http::Method::HEAD)
        .uri("/r/head1")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "https://example.com/h");
}

// =============================================================================
// Preview Tests
// =============================================================================

#[actix_web::test]
async fn test_preview_redirects_without_counting() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("preview-abc123XYZ0", "url", "example.com/draft");
    qr.short_code = "preview-abc123XYZ0".to_string();
    cache.insert("preview-abc123XYZ0".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/r/preview-abc123XYZ0").to_request(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "https://example.com/draft");
}

#[actix_web::test]
async fn test_preview_non_url_types_skip_rewrite() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("preview-txt0000001", "text", "hello world");
    qr.short_code = "preview-txt0000001".to_string();
    cache.insert("preview-txt0000001".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/r/preview-txt0000001").to_request(),
    )
    .await;

    // text 预览不做协议补全，原样输出
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "hello world");
}

#[actix_web::test]
async fn test_preview_expired_or_unknown_is_404() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let app = redirect_app!(cache);

    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/r/preview-gone000000").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // 光秃秃的前缀也是 404
    let resp = test::call_service(&app, TestRequest::get().uri("/r/preview-").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_preview_inactive_is_404() {
    init_test_env().await;

    let cache = Arc::new(MockCache::new());
    let mut qr = test_qr("preview-off0000001", "url", "example.com");
    qr.short_code = "preview-off0000001".to_string();
    qr.is_active = false;
    cache.insert("preview-off0000001".to_string(), qr).await;

    let app = redirect_app!(cache);
    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/r/preview-off0000001").to_request(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
