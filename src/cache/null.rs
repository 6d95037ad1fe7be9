use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{CacheResult, CompositeCacheTrait};
use crate::storage::QrCode;

/// 空缓存实现：一切 miss，直接回源（测试与缓存禁用场景）
pub struct NullCache;

impl NullCache {
    pub fn create() -> Arc<dyn CompositeCacheTrait> {
        Arc::new(Self)
    }
}

#[async_trait]
impl CompositeCacheTrait for NullCache {
    async fn get(&self, _key: &str) -> CacheResult {
        CacheResult::ExistsButNoValue
    }

    async fn insert(&self, _key: String, _value: QrCode) {}

    async fn remove(&self, _key: &str) {}

    async fn mark_not_found(&self, _key: &str) {}

    async fn invalidate_all(&self) {}

    async fn load_codes(&self, _codes: &[String]) {}
}
