pub mod global;
pub mod manager;
pub mod sink;

pub use manager::ScanManager;
pub use sink::{DetailedScanSink, ScanSink};

use chrono::{DateTime, Utc};

/// 详细扫描信息（scan_logs 的一行）
#[derive(Debug, Clone)]
pub struct ScanDetail {
    /// QR 码主键（scan_logs 外键）
    pub qr_code_id: String,
    /// 扫描时间戳
    pub timestamp: DateTime<Utc>,
    /// 来源页面 (Referer header，原样存储)
    pub referrer: Option<String>,
    /// UA 哈希（user_agents 表去重键）
    pub user_agent_hash: Option<String>,
    /// woothee 解析结果
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    /// 客户端 IP 地址
    pub ip_address: Option<String>,
    /// 国家代码 (ISO 3166-1 alpha-2)
    pub country: Option<String>,
    /// 城市名称
    pub city: Option<String>,
}

impl ScanDetail {
    /// 创建新的扫描详情
    pub fn new(qr_code_id: String) -> Self {
        Self {
            qr_code_id,
            timestamp: Utc::now(),
            referrer: None,
            user_agent_hash: None,
            device_type: None,
            os: None,
            browser: None,
            ip_address: None,
            country: None,
            city: None,
        }
    }

    /// 设置地理位置信息
    pub fn with_geo(mut self, country: Option<String>, city: Option<String>) -> Self {
        self.country = country;
        self.city = city;
        self
    }
}
