//! 目标数据验证与重写
//!
//! 创建/更新时按 qr_type 验证 original_data；redirect 热路径按
//! qr_type 把 original_data 重写成可跳转的 URL。

use url::Url;

/// 目标数据验证错误
#[derive(Debug)]
pub enum DestinationError {
    Empty,
    InvalidProtocol(String),
    DangerousProtocol(String),
    InvalidFormat(String),
}

impl std::fmt::Display for DestinationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "destination cannot be empty"),
            Self::InvalidProtocol(proto) => write!(
                f,
                "Invalid protocol: {}. Only http:// and https:// are allowed",
                proto
            ),
            Self::DangerousProtocol(proto) => {
                write!(f, "Dangerous protocol blocked: {}", proto)
            }
            Self::InvalidFormat(msg) => write!(f, "Invalid destination format: {}", msg),
        }
    }
}

impl std::error::Error for DestinationError {}

/// 危险协议列表
const DANGEROUS_PROTOCOLS: &[&str] = &[
    "javascript:",
    "data:",
    "file:",
    "vbscript:",
    "about:",
    "blob:",
];

/// 验证 URL 安全性
///
/// 检查项目：
/// 1. URL 不为空
/// 2. 不是危险协议（javascript:, data:, file: 等）
/// 3. 协议只允许 http:// 或 https://（无协议时按 https:// 补全再验证）
/// 4. URL 格式有效
pub fn validate_url(url: &str) -> Result<(), DestinationError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(DestinationError::Empty);
    }

    let url_lower = url.to_lowercase();

    for proto in DANGEROUS_PROTOCOLS {
        if url_lower.starts_with(proto) {
            return Err(DestinationError::DangerousProtocol(proto.to_string()));
        }
    }

    // 用户常省略协议（"example.com"），redirect 时会补 https://
    let candidate = if url_lower.starts_with("http://") || url_lower.starts_with("https://") {
        url.to_string()
    } else if let Some((proto, _)) = url.split_once("://") {
        return Err(DestinationError::InvalidProtocol(format!("{}:", proto)));
    } else {
        format!("https://{}", url)
    };

    Url::parse(&candidate).map_err(|e| DestinationError::InvalidFormat(e.to_string()))?;

    Ok(())
}

/// 按 qr_type 验证 original_data
///
/// - url: 安全 URL 检查
/// - email: 必须包含 @
/// - phone / whatsapp: 必须含有数字
/// - text / wifi / upi 等静态负载: 仅要求非空
pub fn validate_destination(qr_type: &str, data: &str) -> Result<(), DestinationError> {
    let data = data.trim();

    if data.is_empty() {
        return Err(DestinationError::Empty);
    }

    match qr_type {
        "url" => validate_url(data),
        "email" => {
            if data.contains('@') && !data.starts_with('@') && !data.ends_with('@') {
                Ok(())
            } else {
                Err(DestinationError::InvalidFormat(
                    "email address must contain a local part and a domain".to_string(),
                ))
            }
        }
        "phone" | "whatsapp" => {
            if data.bytes().any(|b| b.is_ascii_digit()) {
                Ok(())
            } else {
                Err(DestinationError::InvalidFormat(
                    "phone number must contain digits".to_string(),
                ))
            }
        }
        _ => Ok(()),
    }
}

/// redirect 热路径的目标重写
///
/// - email: 补 `mailto:`
/// - phone: 补 `tel:`
/// - whatsapp: 提取数字 -> `https://wa.me/{digits}`（已是 wa.me / whatsapp:// 链接则原样）
/// - url 及其他: 无协议时补 `https://`
pub fn rewrite_destination(qr_type: &str, data: &str) -> String {
    let data = data.trim();
    let lower = data.to_lowercase();

    match qr_type {
        "email" => {
            if lower.starts_with("mailto:") {
                data.to_string()
            } else {
                format!("mailto:{}", data)
            }
        }
        "phone" => {
            if lower.starts_with("tel:") {
                data.to_string()
            } else {
                format!("tel:{}", data)
            }
        }
        "whatsapp" => {
            if lower.starts_with("https://wa.me/") || lower.starts_with("whatsapp://") {
                data.to_string()
            } else {
                let digits: String = data.chars().filter(|c| c.is_ascii_digit()).collect();
                format!("https://wa.me/{}", digits)
            }
        }
        _ => {
            if lower.starts_with("http://")
                || lower.starts_with("https://")
                || lower.starts_with("mailto:")
                || lower.starts_with("tel:")
            {
                data.to_string()
            } else {
                format!("https://{}", data)
            }
        }
    }
}
