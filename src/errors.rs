use std::fmt;

#[derive(Debug, Clone)]
pub enum QrifyError {
    CacheConnection(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    PlanLimit(String),
    QrRender(String),
    PaymentProvider(String),
    WebhookSignature(String),
    PasswordHash(String),
    DateParse(String),
}

impl QrifyError {
    pub fn code(&self) -> &'static str {
        match self {
            QrifyError::CacheConnection(_) => "E001",
            QrifyError::DatabaseConfig(_) => "E002",
            QrifyError::DatabaseConnection(_) => "E003",
            QrifyError::DatabaseOperation(_) => "E004",
            QrifyError::FileOperation(_) => "E005",
            QrifyError::Validation(_) => "E006",
            QrifyError::NotFound(_) => "E007",
            QrifyError::Serialization(_) => "E008",
            QrifyError::Unauthorized(_) => "E009",
            QrifyError::Forbidden(_) => "E010",
            QrifyError::Conflict(_) => "E011",
            QrifyError::PlanLimit(_) => "E012",
            QrifyError::QrRender(_) => "E013",
            QrifyError::PaymentProvider(_) => "E014",
            QrifyError::WebhookSignature(_) => "E015",
            QrifyError::PasswordHash(_) => "E016",
            QrifyError::DateParse(_) => "E017",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            QrifyError::CacheConnection(_) => "Cache Connection Error",
            QrifyError::DatabaseConfig(_) => "Database Configuration Error",
            QrifyError::DatabaseConnection(_) => "Database Connection Error",
            QrifyError::DatabaseOperation(_) => "Database Operation Error",
            QrifyError::FileOperation(_) => "File Operation Error",
            QrifyError::Validation(_) => "Validation Error",
            QrifyError::NotFound(_) => "Resource Not Found",
            QrifyError::Serialization(_) => "Serialization Error",
            QrifyError::Unauthorized(_) => "Unauthorized",
            QrifyError::Forbidden(_) => "Forbidden",
            QrifyError::Conflict(_) => "Conflict",
            QrifyError::PlanLimit(_) => "Plan Limit Reached",
            QrifyError::QrRender(_) => "QR Render Error",
            QrifyError::PaymentProvider(_) => "Payment Provider Error",
            QrifyError::WebhookSignature(_) => "Webhook Signature Error",
            QrifyError::PasswordHash(_) => "Password Hash Error",
            QrifyError::DateParse(_) => "Date Parse Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QrifyError::CacheConnection(msg) => msg,
            QrifyError::DatabaseConfig(msg) => msg,
            QrifyError::DatabaseConnection(msg) => msg,
            QrifyError::DatabaseOperation(msg) => msg,
            QrifyError::FileOperation(msg) => msg,
            QrifyError::Validation(msg) => msg,
            QrifyError::NotFound(msg) => msg,
            QrifyError::Serialization(msg) => msg,
            QrifyError::Unauthorized(msg) => msg,
            QrifyError::Forbidden(msg) => msg,
            QrifyError::Conflict(msg) => msg,
            QrifyError::PlanLimit(msg) => msg,
            QrifyError::QrRender(msg) => msg,
            QrifyError::PaymentProvider(msg) => msg,
            QrifyError::WebhookSignature(msg) => msg,
            QrifyError::PasswordHash(msg) => msg,
            QrifyError::DateParse(msg) => msg,
        }
    }

    /// HTTP status the API layer maps this error onto
    pub fn http_status(&self) -> u16 {
        match self {
            QrifyError::Validation(_)
            | QrifyError::DateParse(_)
            | QrifyError::WebhookSignature(_) => 400,
            QrifyError::Unauthorized(_) => 401,
            QrifyError::Forbidden(_) | QrifyError::PlanLimit(_) => 403,
            QrifyError::NotFound(_) => 404,
            QrifyError::Conflict(_) => 409,
            QrifyError::PaymentProvider(_) => 502,
            _ => 500,
        }
    }

    /// Colored output for server mode startup failures
    #[cfg(feature = "server")]
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// Plain output for CLI mode
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for QrifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for QrifyError {}

impl QrifyError {
    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        QrifyError::CacheConnection(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        QrifyError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        QrifyError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        QrifyError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        QrifyError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        QrifyError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        QrifyError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        QrifyError::Serialization(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        QrifyError::Unauthorized(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        QrifyError::Forbidden(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        QrifyError::Conflict(msg.into())
    }

    pub fn plan_limit<T: Into<String>>(msg: T) -> Self {
        QrifyError::PlanLimit(msg.into())
    }

    pub fn qr_render<T: Into<String>>(msg: T) -> Self {
        QrifyError::QrRender(msg.into())
    }

    pub fn payment_provider<T: Into<String>>(msg: T) -> Self {
        QrifyError::PaymentProvider(msg.into())
    }

    pub fn webhook_signature<T: Into<String>>(msg: T) -> Self {
        QrifyError::WebhookSignature(msg.into())
    }

    pub fn password_hash<T: Into<String>>(msg: T) -> Self {
        QrifyError::PasswordHash(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        QrifyError::DateParse(msg.into())
    }
}

impl From<sea_orm::DbErr> for QrifyError {
    fn from(err: sea_orm::DbErr) -> Self {
        QrifyError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for QrifyError {
    fn from(err: std::io::Error) -> Self {
        QrifyError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for QrifyError {
    fn from(err: serde_json::Error) -> Self {
        QrifyError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for QrifyError {
    fn from(err: chrono::ParseError) -> Self {
        QrifyError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QrifyError>;
