use moka::future::Cache;
use std::time::Duration;
use tracing::trace;

/// 负缓存：已确认不存在的短码，短 TTL 内挡掉重复回源
pub struct NegativeCache {
    inner: Cache<String, ()>,
}

impl NegativeCache {
    pub fn new(max_capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        trace!(
            "NegativeCache initialized: max_capacity={}, ttl={}s",
            max_capacity, ttl_secs
        );

        Self { inner }
    }

    pub fn contains(&self, key: &str) -> bool {
        let result = self.inner.contains_key(key);
        if result {
            trace!("Negative cache hit for key: {}", key);
        }
        result
    }

    pub async fn mark(&self, key: &str) {
        trace!("Marking key as not found: {}", key);
        self.inner.insert(key.to_string(), ()).await;
    }

    pub async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_and_contains() {
        let cache = NegativeCache::new(1000, 60);

        assert!(!cache.contains("test_key"));

        cache.mark("test_key").await;
        assert!(cache.contains("test_key"));

        // 其他 key 不受影响
        assert!(!cache.contains("other_key"));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = NegativeCache::new(1000, 60);

        cache.mark("test_key").await;
        cache.remove("test_key").await;
        assert!(!cache.contains("test_key"));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = NegativeCache::new(1000, 1);

        cache.mark("expiring_key").await;
        assert!(cache.contains("expiring_key"));

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        // 触发过期清理
        cache.inner.run_pending_tasks().await;

        assert!(!cache.contains("expiring_key"));
    }
}
