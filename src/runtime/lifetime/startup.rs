use crate::analytics::global::set_global_scan_manager;
use crate::analytics::manager::ScanManager;
use crate::cache::{self, CompositeCacheTrait};
use crate::config::get_config;
use crate::services::user_agent_store::{
    UserAgentStore, get_user_agent_store, set_global_user_agent_store,
};
use crate::storage::{SeaOrmStorage, StorageFactory};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub cache: Arc<dyn CompositeCacheTrait>,
}

/// 准备服务器启动的上下文
/// 包括存储、缓存、扫描计数器和 UA 去重存储
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {:?}", e))?;

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    // 初始化 UserAgentStore（UA 去重存储）
    let ua_store = UserAgentStore::new();
    if let Err(e) = ua_store.load_known_hashes(storage.get_db()).await {
        warn!("Failed to preload UserAgent hashes (non-fatal): {}", e);
    }

    let known_count = ua_store.known_count();
    set_global_user_agent_store(ua_store);
    debug!(
        "UserAgentStore initialized with {} known hashes",
        known_count
    );

    // 启动 UserAgent 后台刷新任务（每 30 秒批量写入新 UA）
    let db_for_ua = storage.get_db().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            if let Some(store) = get_user_agent_store()
                && let Err(e) = store.flush_pending(&db_for_ua).await
            {
                tracing::warn!("Failed to flush UserAgent pending inserts: {}", e);
            }
        }
    });

    // 初始化缓存（扫描计数器刷盘时要回灌缓存，所以先建缓存）
    let cache = cache::CompositeCache::create().context("Failed to create cache")?;

    // 只加载短码到 Bloom Filter（不加载完整数据到对象缓存）
    let codes = storage.load_all_codes().await;
    cache.load_codes(&codes).await;
    debug!("Bloom filter initialized with {} codes", codes.len());

    // 初始化扫描计数器
    let analytics = &get_config().analytics;
    if analytics.enable_tracking {
        if let Some(sink) = storage.as_scan_sink() {
            let flush_interval = Duration::from_secs(analytics.flush_interval_secs);

            let manager = if analytics.enable_detailed_logging {
                // SeaOrmStorage 实现了 DetailedScanSink trait
                let detailed_sink: Arc<dyn crate::analytics::DetailedScanSink> = storage.clone();
                info!("Detailed scan logging enabled, initializing with DetailedScanSink");
                ScanManager::with_detailed_logging(
                    sink,
                    detailed_sink,
                    flush_interval,
                    analytics.max_pending_before_flush,
                )
            } else {
                ScanManager::new(sink, flush_interval, analytics.max_pending_before_flush)
            };
            let manager = Arc::new(manager.with_cache(cache.clone()));

            set_global_scan_manager(manager.clone());

            // 启动后台任务，并保持强引用以确保任务不会被过早销毁
            let mgr_for_task = manager.clone();
            tokio::spawn(async move {
                mgr_for_task.start_background_task().await;
            });

            debug!(
                "ScanManager initialized: flush every {}s or {} pending scans",
                analytics.flush_interval_secs, analytics.max_pending_before_flush
            );
        } else {
            warn!("Scan sink is not available, ScanManager will not be initialized");
        }
    } else {
        warn!("Scan tracking is disabled in configuration");
    }

    check_startup_config();

    debug!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext { storage, cache })
}

/// 启动时的配置体检（只警告，不阻塞）
fn check_startup_config() {
    let config = get_config();

    if config.auth.jwt_secret.len() < 32 {
        warn!(
            "WARNING: JWT Secret is too short ({} bytes). \
            Recommended minimum is 32 bytes for security.",
            config.auth.jwt_secret.len()
        );
    }

    if !config.auth.cookie_secure {
        warn!(
            "WARNING: Cookie Secure flag is disabled. \
            Cookies will be sent over unencrypted HTTP connections. \
            Enable cookie_secure=true for production environments."
        );
    }

    if config.auth.enable_admin_api {
        info!("Admin API available at: /api/admin");
    } else {
        info!("Admin API is disabled (auth.enable_admin_api = false)");
    }

    if config.billing.razorpay_key_id.is_empty() || config.billing.razorpay_key_secret.is_empty() {
        warn!("Razorpay credentials are not configured, order creation will fail");
    }
}
