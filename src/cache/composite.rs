use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::bloom::ExistenceFilter;
use crate::cache::negative::NegativeCache;
use crate::cache::object::ObjectCache;
use crate::cache::{CacheResult, CompositeCacheTrait};
use crate::errors::Result;
use crate::storage::QrCode;

/// 三层组合缓存：Bloom（存在性）-> 负缓存 -> 对象缓存
pub struct CompositeCache {
    filter: ExistenceFilter,
    negative: NegativeCache,
    object: ObjectCache,
}

impl CompositeCache {
    pub fn create() -> Result<Arc<dyn CompositeCacheTrait>> {
        let config = crate::config::get_config();

        let filter = ExistenceFilter::new()?;
        let negative = NegativeCache::new(config.cache.max_capacity, config.cache.negative_ttl);
        let object = ObjectCache::new(config.cache.max_capacity, config.cache.default_ttl);

        Ok(Arc::new(Self {
            filter,
            negative,
            object,
        }))
    }
}

#[async_trait]
impl CompositeCacheTrait for CompositeCache {
    async fn get(&self, key: &str) -> CacheResult {
        // Bloom 否定 = 一定不存在，连负缓存都不用看
        if !self.filter.check(key) {
            return CacheResult::NotFound;
        }
        if self.negative.contains(key) {
            return CacheResult::NotFound;
        }
        match self.object.get(key).await {
            Some(qr) => CacheResult::Found(qr),
            None => CacheResult::ExistsButNoValue,
        }
    }

    async fn insert(&self, key: String, value: QrCode) {
        self.filter.set(&key);
        // 新值落缓存时撤销负缓存标记（新建短码的场景）
        self.negative.remove(&key).await;
        self.object.insert(key, value).await;
    }

    async fn remove(&self, key: &str) {
        // Bloom 不支持删除；对象缓存删掉后由负缓存兜底
        self.object.remove(key).await;
        self.negative.mark(key).await;
    }

    async fn mark_not_found(&self, key: &str) {
        self.negative.mark(key).await;
    }

    async fn apply_scan_deltas(&self, deltas: &[(String, usize)]) {
        for (code, count) in deltas {
            if let Some(mut qr) = self.object.get(code).await {
                qr.scan_count = qr.scan_count.saturating_add(*count as u64);
                self.object.insert(code.clone(), qr).await;
            }
        }
    }

    async fn invalidate_all(&self) {
        self.object.invalidate_all();
        self.negative.clear();
    }

    async fn load_codes(&self, codes: &[String]) {
        if let Err(e) = self.filter.rebuild(codes, 0.001) {
            tracing::warn!("Failed to rebuild bloom filter: {}", e);
        }
    }
}
