use super::ScanDetail;

/// 扫描计数 Sink（聚合模式，key = short_code）
#[async_trait::async_trait]
pub trait ScanSink: Send + Sync {
    async fn flush_scans(&self, updates: Vec<(String, usize)>) -> anyhow::Result<()>;
}

/// 详细扫描日志 Sink（可选实现）
#[async_trait::async_trait]
pub trait DetailedScanSink: Send + Sync {
    /// 记录单条扫描日志
    async fn log_scan(&self, detail: ScanDetail) -> anyhow::Result<()>;

    /// 批量记录扫描日志
    async fn log_scans_batch(&self, details: Vec<ScanDetail>) -> anyhow::Result<()>;
}

pub struct StdoutSink;

#[async_trait::async_trait]
impl ScanSink for StdoutSink {
    async fn flush_scans(&self, updates: Vec<(String, usize)>) -> anyhow::Result<()> {
        println!("Flushing scans: {:?}", updates);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DetailedScanSink for StdoutSink {
    async fn log_scan(&self, detail: ScanDetail) -> anyhow::Result<()> {
        println!("Scan log: {:?}", detail);
        Ok(())
    }

    async fn log_scans_batch(&self, details: Vec<ScanDetail>) -> anyhow::Result<()> {
        println!("Scan logs batch: {} entries", details.len());
        for detail in &details {
            println!("  - {:?}", detail);
        }
        Ok(())
    }
}
