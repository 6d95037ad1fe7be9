pub mod qr_code;
pub mod scan_log;
pub mod subscription;
pub mod user;
pub mod user_agent;

pub use qr_code::Entity as QrCodeEntity;
pub use scan_log::Entity as ScanLogEntity;
pub use subscription::Entity as SubscriptionEntity;
pub use user::Entity as UserEntity;
pub use user_agent::Entity as UserAgentEntity;
