//! Account service
//!
//! Registration, login verification, profile management, cascading account
//! deletion, and the JSON data export.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::{QrifyError, Result};
use crate::storage::{
    PlanTier, Provider, QrCode, QrFilter, Role, SeaOrmStorage, Subscription, User,
};
use crate::utils::password::{hash_password, verify_password};

/// 密码最小长度
const MIN_PASSWORD_LENGTH: usize = 6;

// ============ Request / Export DTOs ============

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// One scan log row in the account export
#[derive(Debug, Clone, Serialize)]
pub struct ScanLogExport {
    pub qr_code_id: String,
    pub scanned_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
}

/// Full account export: profile, codes, subscriptions, scan logs
#[derive(Debug, Clone, Serialize)]
pub struct AccountExport {
    pub exported_at: DateTime<Utc>,
    pub profile: User,
    pub qr_codes: Vec<QrCode>,
    pub subscriptions: Vec<Subscription>,
    pub scan_logs: Vec<ScanLogExport>,
}

// ============ UserService ============

/// Service for account management operations
pub struct UserService {
    storage: Arc<SeaOrmStorage>,
}

impl UserService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    fn validate_email(email: &str) -> Result<String> {
        let email = email.trim().to_lowercase();
        let valid = email.contains('@')
            && !email.starts_with('@')
            && !email.ends_with('@')
            && email.len() <= 254;
        if !valid {
            return Err(QrifyError::validation("invalid email address"));
        }
        Ok(email)
    }

    fn validate_password(password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(QrifyError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    /// Register a new email/password account
    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let email = Self::validate_email(&req.email)?;
        Self::validate_password(&req.password)?;

        let hash = hash_password(&req.password).map_err(|e| {
            error!("Failed to hash password: {}", e);
            QrifyError::password_hash(e.to_string())
        })?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            password_hash: Some(hash),
            provider: Provider::Email,
            role: Role::User,
            plan: PlanTier::Free,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        // 唯一索引兜底，insert_user 把重复邮箱映射成 Conflict
        self.storage.insert_user(&user).await?;

        info!("UserService: registered {}", user.email);
        Ok(user)
    }

    /// Verify email/password credentials for login
    ///
    /// Google-provider rows authenticate upstream and are refused here.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();

        let user = self
            .storage
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| QrifyError::unauthorized("invalid email or password"))?;

        if user.provider != Provider::Email {
            return Err(QrifyError::unauthorized(
                "this account signs in with an external provider",
            ));
        }

        let hash = user
            .password_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| QrifyError::unauthorized("invalid email or password"))?;

        let ok = verify_password(password, hash)
            .map_err(|e| QrifyError::password_hash(e.to_string()))?;
        if !ok {
            return Err(QrifyError::unauthorized("invalid email or password"));
        }

        if !user.is_active {
            return Err(QrifyError::forbidden("this account has been deactivated"));
        }

        Ok(user)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<User> {
        self.storage
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| QrifyError::not_found("user not found"))
    }

    /// Update name and/or email (email with uniqueness check)
    pub async fn update_profile(&self, user_id: &str, req: UpdateProfileRequest) -> Result<User> {
        let mut user = self.get_profile(user_id).await?;

        if let Some(email) = req.email {
            let email = Self::validate_email(&email)?;
            if email != user.email {
                if self.storage.get_user_by_email(&email).await?.is_some() {
                    return Err(QrifyError::conflict("email is already in use"));
                }
                user.email = email;
            }
        }
        if let Some(name) = req.name {
            let name = name.trim().to_string();
            user.name = if name.is_empty() { None } else { Some(name) };
        }
        user.updated_at = Utc::now();

        self.storage.update_user(&user).await?;
        Ok(user)
    }

    /// Change password after verifying the current one
    ///
    /// Blocked for externally-provisioned accounts.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut user = self.get_profile(user_id).await?;

        if user.provider != Provider::Email {
            return Err(QrifyError::forbidden(
                "password changes are not available for this account",
            ));
        }

        Self::validate_password(new_password)?;

        let hash = user
            .password_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| QrifyError::forbidden("this account has no password set"))?;

        let ok = verify_password(current_password, hash)
            .map_err(|e| QrifyError::password_hash(e.to_string()))?;
        if !ok {
            return Err(QrifyError::unauthorized("current password is incorrect"));
        }

        user.password_hash = Some(
            hash_password(new_password).map_err(|e| QrifyError::password_hash(e.to_string()))?,
        );
        user.updated_at = Utc::now();

        self.storage.update_user(&user).await?;
        info!("UserService: password changed for {}", user.email);
        Ok(())
    }

    /// Delete the account and everything it owns
    /// (scan logs -> qr codes -> subscriptions -> user, one transaction)
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        self.storage.delete_user_cascade(user_id).await?;
        self.storage.invalidate_count_cache();

        info!("UserService: deleted account {}", user_id);
        Ok(())
    }

    /// Assemble the full account export document
    pub async fn export_account(&self, user_id: &str) -> Result<AccountExport> {
        let profile = self.get_profile(user_id).await?;

        let qr_codes = self
            .storage
            .load_qrs_filtered(QrFilter {
                user_id: Some(user_id.to_string()),
                ..QrFilter::default()
            })
            .await;

        let subscriptions = self.storage.list_subscriptions_for_user(user_id).await?;

        let qr_ids: Vec<String> = qr_codes.iter().map(|qr| qr.id.clone()).collect();
        let scan_logs = self
            .storage
            .export_scan_logs(&qr_ids, 10_000)
            .await
            .map_err(|e| QrifyError::database_operation(e.to_string()))?
            .into_iter()
            .map(|row| ScanLogExport {
                qr_code_id: row.qr_code_id,
                scanned_at: row.scanned_at,
                ip_address: row.ip_address,
                device_type: row.device_type,
                os: row.os,
                browser: row.browser,
                country: row.country,
                city: row.city,
                referrer: row.referrer,
            })
            .collect();

        Ok(AccountExport {
            exported_at: Utc::now(),
            profile,
            qr_codes,
            subscriptions,
            scan_logs,
        })
    }

    /// Create an admin account (CLI bootstrap path)
    pub async fn create_admin(&self, email: &str, password: &str) -> Result<User> {
        let mut user = self
            .register(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                name: None,
            })
            .await?;

        user.role = Role::Admin;
        user.updated_at = Utc::now();
        self.storage.update_user(&user).await?;

        info!("UserService: created admin {}", user.email);
        Ok(user)
    }
}
