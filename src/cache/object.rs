use moka::future::Cache;
use moka::policy::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::storage::QrCode;

/// 自定义过期策略，基于 QrCode.expires_at 计算过期时间
struct QrCodeExpiry {
    default_ttl: Duration,
}

impl Expiry<String, QrCode> for QrCodeExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &QrCode,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.expires_at {
            Some(expires_at) => {
                let now = chrono::Utc::now();
                if expires_at <= now {
                    // 已过期，设置极短 TTL
                    Some(Duration::from_secs(1))
                } else {
                    let remaining = (expires_at - now).num_seconds() as u64;
                    Some(Duration::from_secs(
                        remaining.min(self.default_ttl.as_secs()),
                    ))
                }
            }
            None => Some(self.default_ttl), // 无过期时间，使用默认 TTL
        }
    }
}

/// 对象缓存：short_code -> QrCode
pub struct ObjectCache {
    inner: Cache<String, QrCode>,
}

impl ObjectCache {
    pub fn new(max_capacity: u64, default_ttl_secs: u64) -> Self {
        let default_ttl = Duration::from_secs(default_ttl_secs);

        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(QrCodeExpiry { default_ttl })
            .build();

        debug!(
            "ObjectCache initialized with max capacity: {}, default TTL: {}s",
            max_capacity, default_ttl_secs
        );
        Self { inner }
    }

    pub async fn get(&self, key: &str) -> Option<QrCode> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, value: QrCode) {
        self.inner.insert(key, value).await;
    }

    pub async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}
