use bloomfilter::Bloom;
use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{QrifyError, Result};

/// 短码存在性过滤器
///
/// `check` 返回 false 表示一定不存在；true 表示可能存在。
pub struct ExistenceFilter {
    inner: RwLock<Bloom<str>>,
}

/// 分段预留策略，计算 Bloom Filter 实际容量
/// - < 5000: 预留 50%（小规模需要更多余量）
/// - 5000-100000: 预留 20%
/// - > 100000: 预留 10%（最多 100 万）
fn calculate_capacity(count: usize) -> usize {
    let reserve = if count < 5000 {
        count / 2
    } else if count < 100000 {
        count / 5
    } else {
        (count / 10).min(1_000_000)
    };
    count + reserve.max(1000) // 最少预留 1000
}

impl ExistenceFilter {
    pub fn new() -> Result<Self> {
        // 使用最小初始容量，startup 中的 load_codes 会立即按实际数量 rebuild
        let bloom = Bloom::new_for_fp_rate(100, 0.001).map_err(|e| {
            QrifyError::cache_connection(format!("Failed to create bloom filter: {e}"))
        })?;
        Ok(Self {
            inner: RwLock::new(bloom),
        })
    }

    pub fn check(&self, key: &str) -> bool {
        self.inner.read().check(key)
    }

    pub fn set(&self, key: &str) {
        self.inner.write().set(key);
    }

    /// 在锁外构建完整的新 Bloom Filter，然后原子交换。
    /// 读取端看到的要么是旧的完整 Bloom，要么是新的完整 Bloom。
    pub fn rebuild(&self, keys: &[String], fp_rate: f64) -> Result<()> {
        let capacity = calculate_capacity(keys.len());
        let mut new_bloom = Bloom::new_for_fp_rate(capacity, fp_rate).map_err(|e| {
            QrifyError::cache_connection(format!("Failed to rebuild bloom filter: {e}"))
        })?;
        for key in keys {
            new_bloom.set(key.as_str());
        }

        *self.inner.write() = new_bloom;

        debug!(
            "Bloom filter rebuilt with {} keys, capacity: {}, fp_rate: {}",
            keys.len(),
            capacity,
            fp_rate
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_empty_returns_false() {
        let filter = ExistenceFilter::new().unwrap();
        assert!(!filter.check("nonexistent"));
    }

    #[test]
    fn test_set_and_check() {
        let filter = ExistenceFilter::new().unwrap();

        filter.set("aB3xY9k");
        assert!(filter.check("aB3xY9k"));

        // 未设置的 key 应该返回 false（大概率）
        assert!(!filter.check("zZ9qW1m"));
    }

    #[test]
    fn test_rebuild_replaces_filter_atomically() {
        let filter = ExistenceFilter::new().unwrap();

        filter.set("old_key_1");
        assert!(filter.check("old_key_1"));

        let new_keys = vec!["new_key_a".to_string(), "new_key_b".to_string()];
        filter.rebuild(&new_keys, 0.001).unwrap();

        assert!(!filter.check("old_key_1"));
        assert!(filter.check("new_key_a"));
        assert!(filter.check("new_key_b"));
    }

    #[test]
    fn test_false_positive_rate_within_bounds() {
        let filter = ExistenceFilter::new().unwrap();

        // 插入 1000 个 key（rebuild 按实际数量扩容）
        let keys: Vec<String> = (0..1000).map(|i| format!("existing_{}", i)).collect();
        filter.rebuild(&keys, 0.001).unwrap();

        // 测试 10000 个不存在的 key，统计误报率
        let mut false_positives = 0;
        for i in 0..10000 {
            if filter.check(&format!("nonexistent_{}", i)) {
                false_positives += 1;
            }
        }

        // fp_rate 0.001，10000 次查询期望误报约 10 次，允许最多 50 次
        assert!(
            false_positives < 50,
            "False positive rate too high: {}/10000",
            false_positives
        );
    }
}
