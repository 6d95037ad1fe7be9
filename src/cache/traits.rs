use async_trait::async_trait;

use crate::storage::QrCode;

/// 缓存查询结果
#[derive(Debug, Clone)]
pub enum CacheResult {
    /// 确定不存在（Bloom 否定或负缓存命中）
    NotFound,
    /// 可能存在但没有缓存值，需要回源
    ExistsButNoValue,
    /// 成功获取到缓存值
    Found(QrCode),
}

/// redirect 热路径使用的组合缓存：Bloom -> 负缓存 -> 对象缓存
#[async_trait]
pub trait CompositeCacheTrait: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult;
    async fn insert(&self, key: String, value: QrCode);
    async fn remove(&self, key: &str);

    /// 回源确认不存在后标记，短 TTL 内挡掉重复回源
    async fn mark_not_found(&self, key: &str);

    /// 扫描增量落库成功后回灌缓存，保持缓存内 scan_count 与库一致
    ///
    /// 没有这步，flush 之后缓存里的旧计数配上清零的缓冲增量会让
    /// scan_limit 检查重新放行。
    async fn apply_scan_deltas(&self, _deltas: &[(String, usize)]) {}

    async fn invalidate_all(&self);

    /// 启动时批量加载所有短码进 Bloom Filter
    async fn load_codes(&self, codes: &[String]);
}
