use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};
use ts_rs::TS;

use super::types::TS_EXPORT_PATH;

/// Cookie SameSite policy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, TS, EnumIter, AsRefStr,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl std::fmt::Display for SameSitePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

impl std::str::FromStr for SameSitePolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            _ => Err(format!(
                "Invalid SameSite policy: '{}'. Valid: Strict, Lax, None",
                s
            )),
        }
    }
}

/// HTTP method enum for CORS configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumIter, AsRefStr)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(format!(
                "Invalid HTTP method: '{}'. Valid: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS",
                s
            )),
        }
    }
}

/// Application configuration, loaded once at startup.
///
/// Priority: ENV > config.toml > defaults.
/// ENV prefix: QRIFY, separator: __
/// Example: QRIFY__SERVER__PORT=9999
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

impl StaticConfig {
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("QRIFY")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// Generate a sample TOML config file
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub unix_socket: Option<String>,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// Externally reachable base URL; rendered QR codes encode
    /// `{public_url}/r/{code}`, so this must match the deployment.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub default_ttl: u64,
    /// TTL for cached "this code does not exist" answers
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl: u64,
    #[serde(default = "default_memory_capacity")]
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. Empty = generate a random one at boot
    /// (sessions won't survive restarts; fine for dev, warned about).
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    #[serde(default)]
    pub cookie_same_site: SameSitePolicy,
    /// CIDR blocks whose X-Forwarded-For headers are trusted
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Disables /api/admin entirely when false
    #[serde(default = "default_enable_admin_api")]
    pub enable_admin_api: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<HttpMethod>,
    #[serde(default)]
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_enable_tracking")]
    pub enable_tracking: bool,
    /// Write per-scan rows to scan_logs (not just the counter)
    #[serde(default = "default_enable_detailed_logging")]
    pub enable_detailed_logging: bool,
    #[serde(default = "default_enable_ip_logging")]
    pub enable_ip_logging: bool,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_max_pending")]
    pub max_pending_before_flush: usize,
    /// MaxMindDB file path (GeoLite2-City.mmdb). When set and readable the
    /// lookup is local; otherwise the external API is used.
    #[serde(default)]
    pub maxminddb_path: Option<String>,
    /// External GeoIP API URL with {ip} placeholder
    #[serde(default = "default_geoip_api_url")]
    pub geoip_api_url: String,
    #[serde(default = "default_enable_geoip")]
    pub enable_geoip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub razorpay_key_id: String,
    #[serde(default)]
    pub razorpay_key_secret: String,
    #[serde(default)]
    pub razorpay_webhook_secret: String,
    #[serde(default = "default_razorpay_api_base")]
    pub razorpay_api_base: String,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_database_url() -> String {
    "qrify.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_negative_ttl() -> u64 {
    60
}

fn default_memory_capacity() -> u64 {
    10000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_access_ttl() -> u64 {
    3600
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_cookie_secure() -> bool {
    true
}

fn default_enable_admin_api() -> bool {
    true
}

fn default_cors_methods() -> Vec<HttpMethod> {
    vec![
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Options,
    ]
}

fn default_enable_tracking() -> bool {
    true
}

fn default_enable_detailed_logging() -> bool {
    true
}

fn default_enable_ip_logging() -> bool {
    true
}

fn default_flush_interval() -> u64 {
    30
}

fn default_max_pending() -> usize {
    100
}

fn default_geoip_api_url() -> String {
    "http://ip-api.com/json/{ip}?fields=countryCode,city".to_string()
}

fn default_enable_geoip() -> bool {
    true
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            unix_socket: None,
            cpu_count: default_cpu_count(),
            public_url: default_public_url(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_cache_ttl(),
            negative_ttl: default_negative_ttl(),
            max_capacity: default_memory_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            cookie_secure: default_cookie_secure(),
            cookie_same_site: SameSitePolicy::default(),
            trusted_proxies: Vec::new(),
            enable_admin_api: default_enable_admin_api(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: default_cors_methods(),
            allow_credentials: false,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enable_tracking: default_enable_tracking(),
            enable_detailed_logging: default_enable_detailed_logging(),
            enable_ip_logging: default_enable_ip_logging(),
            flush_interval_secs: default_flush_interval(),
            max_pending_before_flush: default_max_pending(),
            maxminddb_path: None,
            geoip_api_url: default_geoip_api_url(),
            enable_geoip: default_enable_geoip(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            razorpay_webhook_secret: String::new(),
            razorpay_api_base: default_razorpay_api_base(),
        }
    }
}
