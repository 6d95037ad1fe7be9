//! Service-layer tests: accounts, QR CRUD, plan limits, ownership

use std::sync::Arc;

use tempfile::TempDir;

use qrify::cache::NullCache;
use qrify::config::{StaticConfig, replace_config};
use qrify::errors::QrifyError;
use qrify::services::{
    CreateQrRequest, QrService, RegisterRequest, UpdateProfileRequest, UserService,
};
use qrify::storage::{PlanTier, QrType, Role, SeaOrmStorage, StorageFactory, User};

// =============================================================================
// Test Setup
// =============================================================================

static TEST_DIR: std::sync::OnceLock<TempDir> = std::sync::OnceLock::new();
static STORAGE: std::sync::OnceLock<Arc<SeaOrmStorage>> = std::sync::OnceLock::new();
static INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn init_test_env() {
    INIT.get_or_init(|| async {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("services_test.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.auth.jwt_secret = "services-test-secret-services-test-secret".to_string();
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

fn user_service() -> UserService {
    UserService::new(get_storage())
}

fn qr_service() -> QrService {
    QrService::new(get_storage(), NullCache::create())
}

async fn register_user(email: &str) -> User {
    user_service()
        .register(RegisterRequest {
            email: email.to_string(),
            password: "hunter22".to_string(),
            name: None,
        })
        .await
        .expect("registration failed")
}

fn url_qr_request(name: &str) -> CreateQrRequest {
    CreateQrRequest {
        name: name.to_string(),
        qr_type: QrType::Url,
        data: "https://example.com".to_string(),
        is_dynamic: true,
        expires_at: None,
        scan_limit: None,
        foreground_color: None,
        background_color: None,
        gradient: None,
        eye_shape: None,
        module_style: None,
        logo_data: None,
    }
}

// =============================================================================
// Account Tests
// =============================================================================

#[tokio::test]
async fn test_register_and_authenticate() {
    init_test_env().await;
    let service = user_service();

    let user = register_user("alice@example.com").await;
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.plan, PlanTier::Free);
    assert_eq!(user.role, Role::User);

    let authed = service
        .authenticate("alice@example.com", "hunter22")
        .await
        .expect("authentication failed");
    assert_eq!(authed.id, user.id);

    // 登录时邮箱大小写不敏感
    assert!(
        service
            .authenticate("ALICE@example.com", "hunter22")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    init_test_env().await;
    let service = user_service();

    register_user("bob@example.com").await;

    let err = service
        .authenticate("bob@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Unauthorized(_)));

    // 不存在的账号给同样的错误，不泄露邮箱是否注册
    let err = service
        .authenticate("nobody@example.com", "hunter22")
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Unauthorized(_)));
}

#[tokio::test]
async fn test_duplicate_email_conflict() {
    init_test_env().await;
    let service = user_service();

    register_user("carol@example.com").await;

    let err = service
        .register(RegisterRequest {
            email: "carol@example.com".to_string(),
            password: "different-pass".to_string(),
            name: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Conflict(_)));
}

#[tokio::test]
async fn test_register_validation() {
    init_test_env().await;
    let service = user_service();

    let err = service
        .register(RegisterRequest {
            email: "not-an-email".to_string(),
            password: "hunter22".to_string(),
            name: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Validation(_)));

    let err = service
        .register(RegisterRequest {
            email: "short@example.com".to_string(),
            password: "abc".to_string(),
            name: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Validation(_)));
}

#[tokio::test]
async fn test_change_password() {
    init_test_env().await;
    let service = user_service();

    let user = register_user("dave@example.com").await;

    // 当前密码错误
    let err = service
        .change_password(&user.id, "wrong-current", "new-password")
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Unauthorized(_)));

    // 正确修改后旧密码失效
    service
        .change_password(&user.id, "hunter22", "new-password")
        .await
        .expect("password change failed");

    assert!(
        service
            .authenticate("dave@example.com", "hunter22")
            .await
            .is_err()
    );
    assert!(
        service
            .authenticate("dave@example.com", "new-password")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_update_profile_email_uniqueness() {
    init_test_env().await;
    let service = user_service();

    register_user("erin1@example.com").await;
    let user = register_user("erin2@example.com").await;

    let err = service
        .update_profile(
            &user.id,
            UpdateProfileRequest {
                name: None,
                email: Some("erin1@example.com".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Conflict(_)));

    let updated = service
        .update_profile(
            &user.id,
            UpdateProfileRequest {
                name: Some("Erin".to_string()),
                email: None,
            },
        )
        .await
        .expect("profile update failed");
    assert_eq!(updated.name.as_deref(), Some("Erin"));
}

#[tokio::test]
async fn test_delete_account_cascades() {
    init_test_env().await;
    let service = user_service();
    let qr_svc = qr_service();

    let user = register_user("frank@example.com").await;
    let qr = qr_svc
        .create_qr(&user, url_qr_request("frank qr"))
        .await
        .expect("create failed");

    service
        .delete_account(&user.id)
        .await
        .expect("delete failed");

    let err = service.get_profile(&user.id).await.unwrap_err();
    assert!(matches!(err, QrifyError::NotFound(_)));
    assert!(get_storage().get_qr_by_id(&qr.id).await.unwrap().is_none());
}

// =============================================================================
// QR CRUD Tests
// =============================================================================

#[tokio::test]
async fn test_create_qr_assigns_short_code() {
    init_test_env().await;
    let user = register_user("gina@example.com").await;

    let qr = qr_service()
        .create_qr(&user, url_qr_request("site"))
        .await
        .expect("create failed");

    assert_eq!(qr.short_code.len(), 7);
    assert!(qr.is_active);
    assert_eq!(qr.scan_count, 0);
    assert_eq!(qr.foreground_color, "#000000");
}

#[tokio::test]
async fn test_free_plan_limit_enforced() {
    init_test_env().await;
    let user = register_user("hank@example.com").await;
    let service = qr_service();

    for i in 0..3 {
        service
            .create_qr(&user, url_qr_request(&format!("qr {}", i)))
            .await
            .expect("create within limit failed");
    }

    // Free 套餐上限 3 个
    let err = service
        .create_qr(&user, url_qr_request("one too many"))
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::PlanLimit(_)));
}

#[tokio::test]
async fn test_deactivated_qr_frees_plan_slot() {
    init_test_env().await;
    let user = register_user("iris@example.com").await;
    let service = qr_service();

    let mut first = None;
    for i in 0..3 {
        let qr = service
            .create_qr(&user, url_qr_request(&format!("qr {}", i)))
            .await
            .expect("create failed");
        if i == 0 {
            first = Some(qr);
        }
    }

    // 限额只数 active 的码，停用一个就能再建
    let first = first.unwrap();
    service
        .update_qr(
            &first.id,
            &user,
            qrify::services::UpdateQrRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("deactivate failed");

    assert!(
        service
            .create_qr(&user, url_qr_request("replacement"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_create_qr_validates_destination() {
    init_test_env().await;
    let user = register_user("judy@example.com").await;
    let service = qr_service();

    let mut req = url_qr_request("bad email");
    req.qr_type = QrType::Email;
    req.data = "missing-at-sign".to_string();
    let err = service.create_qr(&user, req).await.unwrap_err();
    assert!(matches!(err, QrifyError::Validation(_)));

    let mut req = url_qr_request("bad url");
    req.data = "javascript:alert(1)".to_string();
    let err = service.create_qr(&user, req).await.unwrap_err();
    assert!(matches!(err, QrifyError::Validation(_)));
}

#[tokio::test]
async fn test_update_destination_requires_dynamic() {
    init_test_env().await;
    let user = register_user("kyle@example.com").await;
    let service = qr_service();

    let mut req = url_qr_request("static code");
    req.is_dynamic = false;
    let qr = service.create_qr(&user, req).await.expect("create failed");

    let err = service
        .update_destination(&qr.id, &user, "https://example.com/new")
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::Validation(_)));
}

#[tokio::test]
async fn test_update_destination_keeps_short_code() {
    init_test_env().await;
    let user = register_user("lena@example.com").await;
    let service = qr_service();

    let qr = service
        .create_qr(&user, url_qr_request("dynamic"))
        .await
        .expect("create failed");

    let updated = service
        .update_destination(&qr.id, &user, "https://example.com/v2")
        .await
        .expect("update failed");

    assert_eq!(updated.short_code, qr.short_code);
    assert_eq!(updated.original_data, "https://example.com/v2");
}

#[tokio::test]
async fn test_ownership_hides_foreign_rows() {
    init_test_env().await;
    let owner = register_user("mara@example.com").await;
    let other = register_user("nick@example.com").await;
    let service = qr_service();

    let qr = service
        .create_qr(&owner, url_qr_request("private"))
        .await
        .expect("create failed");

    // 非所有者拿到 NotFound 而不是 Forbidden，不暴露码的存在
    let err = service.get_qr(&qr.id, &other).await.unwrap_err();
    assert!(matches!(err, QrifyError::NotFound(_)));

    let err = service
        .update_destination(&qr.id, &other, "https://evil.example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, QrifyError::NotFound(_)));

    let err = service.delete_qr(&qr.id, &other).await.unwrap_err();
    assert!(matches!(err, QrifyError::NotFound(_)));

    // 管理员不受所有权限制
    let mut admin = other.clone();
    admin.role = Role::Admin;
    assert!(service.get_qr(&qr.id, &admin).await.is_ok());
}

#[tokio::test]
async fn test_delete_qr() {
    init_test_env().await;
    let user = register_user("olga@example.com").await;
    let service = qr_service();

    let qr = service
        .create_qr(&user, url_qr_request("to delete"))
        .await
        .expect("create failed");

    service
        .delete_qr(&qr.id, &user)
        .await
        .expect("delete failed");

    let err = service.get_qr(&qr.id, &user).await.unwrap_err();
    assert!(matches!(err, QrifyError::NotFound(_)));
}

#[tokio::test]
async fn test_list_qrs_paginates_per_user() {
    init_test_env().await;
    let user = register_user("pete@example.com").await;
    let other = register_user("quin@example.com").await;
    let service = qr_service();

    for i in 0..3 {
        service
            .create_qr(&user, url_qr_request(&format!("mine {}", i)))
            .await
            .expect("create failed");
    }
    service
        .create_qr(&other, url_qr_request("not mine"))
        .await
        .expect("create failed");

    let (page, total) = service
        .list_qrs(&user.id, qrify::storage::QrFilter::default(), 1, 2)
        .await
        .expect("list failed");
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    assert!(page.iter().all(|qr| qr.user_id == user.id));

    let (page2, _) = service
        .list_qrs(&user.id, qrify::storage::QrFilter::default(), 2, 2)
        .await
        .expect("list failed");
    assert_eq!(page2.len(), 1);
}
