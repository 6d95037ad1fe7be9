//! QR code management service
//!
//! Unified business logic for QR CRUD, shared between HTTP handlers and
//! the admin CLI. Plan limits, ownership checks, and short-code generation
//! all live here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CompositeCacheTrait;
use crate::config::get_config;
use crate::errors::{QrifyError, Result};
use crate::storage::{QrCode, QrFilter, QrType, Role, SeaOrmStorage, User};
use crate::utils::generate_random_code;
use crate::utils::url_validator::validate_destination;

/// 短码长度（7 位字母数字，62^7 ≈ 3.5e12）
const SHORT_CODE_LENGTH: usize = 7;
/// 生成冲突时的最大重试次数
const MAX_CODE_ATTEMPTS: usize = 10;

// ============ Request DTOs ============

/// Request to create a QR code
#[derive(Debug, Clone)]
pub struct CreateQrRequest {
    pub name: String,
    pub qr_type: QrType,
    pub data: String,
    pub is_dynamic: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scan_limit: Option<u64>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub gradient: Option<String>,
    pub eye_shape: Option<String>,
    pub module_style: Option<String>,
    pub logo_data: Option<String>,
}

/// Request to update QR metadata / design. None = keep existing.
#[derive(Debug, Clone, Default)]
pub struct UpdateQrRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    /// Some(None) clears the expiry
    pub expires_at: Option<Option<DateTime<Utc>>>,
    /// Some(None) removes the limit
    pub scan_limit: Option<Option<u64>>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub gradient: Option<Option<String>>,
    pub eye_shape: Option<String>,
    pub module_style: Option<String>,
    pub logo_data: Option<Option<String>>,
}

/// Public embed info for an active QR code
#[derive(Debug, Clone)]
pub struct EmbedInfo {
    pub name: String,
    pub short_url: String,
    pub image_url: String,
}

// ============ QrService ============

/// Service for QR code management operations
pub struct QrService {
    storage: Arc<SeaOrmStorage>,
    cache: Arc<dyn CompositeCacheTrait>,
}

impl QrService {
    pub fn new(storage: Arc<SeaOrmStorage>, cache: Arc<dyn CompositeCacheTrait>) -> Self {
        Self { storage, cache }
    }

    /// `{public_url}/r/{code}` — the URL a rendered QR encodes
    pub fn short_url(code: &str) -> String {
        format!("{}/r/{}", get_config().server.public_url, code)
    }

    /// `{public_url}/i/{code}.svg`
    pub fn image_url(code: &str) -> String {
        format!("{}/i/{}.svg", get_config().server.public_url, code)
    }

    /// Generate a unique 7-char short code, retrying on collision
    async fn generate_unique_code(&self) -> Result<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_random_code(SHORT_CODE_LENGTH);
            if !self.storage.short_code_exists(&code).await? {
                return Ok(code);
            }
            warn!("Short code collision, regenerating");
        }
        Err(QrifyError::database_operation(
            "failed to generate a unique short code",
        ))
    }

    /// Ownership gate: the row's owner or an admin
    fn check_ownership(qr: &QrCode, requester: &User) -> Result<()> {
        if qr.user_id != requester.id && requester.role != Role::Admin {
            return Err(QrifyError::not_found("QR code not found"));
        }
        Ok(())
    }

    /// Create a new QR code, enforcing the plan limit
    pub async fn create_qr(&self, user: &User, req: CreateQrRequest) -> Result<QrCode> {
        if req.name.trim().is_empty() {
            return Err(QrifyError::validation("name is required"));
        }

        let qr_type = req.qr_type.to_string();
        validate_destination(&qr_type, &req.data)
            .map_err(|e| QrifyError::validation(e.to_string()))?;

        // 套餐限额：active 码计数，达到上限即拒绝
        let active = self.storage.count_active_qrs(&user.id).await?;
        let limit = user.plan.qr_limit();
        if active >= limit {
            return Err(QrifyError::plan_limit(format!(
                "your {} plan allows at most {} active QR codes",
                user.plan, limit
            )));
        }

        let code = self.generate_unique_code().await?;
        let now = Utc::now();

        let qr = QrCode {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            name: req.name.trim().to_string(),
            qr_type,
            original_data: req.data.trim().to_string(),
            short_code: code,
            is_dynamic: req.is_dynamic,
            is_active: true,
            expires_at: req.expires_at,
            scan_limit: req.scan_limit,
            scan_count: 0,
            foreground_color: req
                .foreground_color
                .unwrap_or_else(|| "#000000".to_string()),
            background_color: req
                .background_color
                .unwrap_or_else(|| "#ffffff".to_string()),
            gradient: req.gradient,
            eye_shape: req.eye_shape.unwrap_or_else(|| "square".to_string()),
            module_style: req.module_style.unwrap_or_else(|| "square".to_string()),
            logo_data: req.logo_data,
            created_at: now,
            updated_at: now,
        };

        self.storage.insert_qr(&qr).await?;
        self.cache.insert(qr.short_code.clone(), qr.clone()).await;
        self.storage.invalidate_count_cache();

        info!(
            "QrService: created '{}' ({}) for user {}",
            qr.short_code, qr.qr_type, qr.user_id
        );
        Ok(qr)
    }

    /// Get a single QR code, enforcing ownership
    pub async fn get_qr(&self, id: &str, requester: &User) -> Result<QrCode> {
        let qr = self
            .storage
            .get_qr_by_id(id)
            .await?
            .ok_or_else(|| QrifyError::not_found("QR code not found"))?;
        Self::check_ownership(&qr, requester)?;
        Ok(qr)
    }

    /// List the caller's QR codes with pagination and filtering
    pub async fn list_qrs(
        &self,
        user_id: &str,
        mut filter: QrFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<QrCode>, u64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        filter.user_id = Some(user_id.to_string());

        Ok(self.storage.list_qrs_paginated(page, page_size, filter).await)
    }

    /// Update metadata and design fields
    pub async fn update_qr(&self, id: &str, requester: &User, req: UpdateQrRequest) -> Result<QrCode> {
        let mut qr = self.get_qr(id, requester).await?;

        if let Some(name) = req.name {
            if name.trim().is_empty() {
                return Err(QrifyError::validation("name cannot be empty"));
            }
            qr.name = name.trim().to_string();
        }
        if let Some(active) = req.is_active {
            qr.is_active = active;
        }
        if let Some(expires_at) = req.expires_at {
            qr.expires_at = expires_at;
        }
        if let Some(scan_limit) = req.scan_limit {
            qr.scan_limit = scan_limit;
        }
        if let Some(fg) = req.foreground_color {
            qr.foreground_color = fg;
        }
        if let Some(bg) = req.background_color {
            qr.background_color = bg;
        }
        if let Some(gradient) = req.gradient {
            qr.gradient = gradient;
        }
        if let Some(eye) = req.eye_shape {
            qr.eye_shape = eye;
        }
        if let Some(style) = req.module_style {
            qr.module_style = style;
        }
        if let Some(logo) = req.logo_data {
            qr.logo_data = logo;
        }
        qr.updated_at = Utc::now();

        self.storage.update_qr(&qr).await?;
        self.cache.insert(qr.short_code.clone(), qr.clone()).await;
        self.storage.invalidate_count_cache();

        info!("QrService: updated '{}'", qr.short_code);
        Ok(qr)
    }

    /// Rewrite the destination of a dynamic QR code
    ///
    /// The short code (and therefore the printed image) never changes.
    pub async fn update_destination(
        &self,
        id: &str,
        requester: &User,
        data: &str,
    ) -> Result<QrCode> {
        let mut qr = self.get_qr(id, requester).await?;

        if !qr.is_dynamic {
            return Err(QrifyError::validation(
                "only dynamic QR codes can change their destination",
            ));
        }

        validate_destination(&qr.qr_type, data)
            .map_err(|e| QrifyError::validation(e.to_string()))?;

        qr.original_data = data.trim().to_string();
        qr.updated_at = Utc::now();

        self.storage.update_qr(&qr).await?;
        self.cache.insert(qr.short_code.clone(), qr.clone()).await;

        info!("QrService: redirected '{}' to new destination", qr.short_code);
        Ok(qr)
    }

    /// Delete a QR code and its scan logs
    pub async fn delete_qr(&self, id: &str, requester: &User) -> Result<()> {
        let qr = self.get_qr(id, requester).await?;

        self.storage.delete_qr(id).await?;
        self.cache.remove(&qr.short_code).await;
        self.storage.invalidate_count_cache();

        info!("QrService: deleted '{}'", qr.short_code);
        Ok(())
    }

    /// Public embed info; only active codes are embeddable
    pub async fn embed_info(&self, id: &str) -> Result<EmbedInfo> {
        let qr = self
            .storage
            .get_qr_by_id(id)
            .await?
            .filter(|qr| qr.is_active)
            .ok_or_else(|| QrifyError::not_found("QR code not found"))?;

        Ok(EmbedInfo {
            name: qr.name,
            short_url: Self::short_url(&qr.short_code),
            image_url: Self::image_url(&qr.short_code),
        })
    }

    /// Render the stored design of a short code as SVG (for /i/{code}.svg)
    pub async fn render_by_code(&self, code: &str) -> Result<String> {
        let qr = self
            .storage
            .get_qr_by_code(code)
            .await
            .ok_or_else(|| QrifyError::not_found("QR code not found"))?;

        let design = super::render::QrDesign::from(&qr);
        super::render::render_qr_svg(&Self::short_url(&qr.short_code), &design)
    }
}
