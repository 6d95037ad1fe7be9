pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod health;
pub mod helpers;
pub mod qr;
pub mod redirect;
pub mod stats;

pub use account::account_routes;
pub use admin::admin_routes;
pub use auth::auth_routes;
pub use billing::{billing_public_routes, billing_routes};
pub use health::{AppStartTime, HealthService, health_routes};
pub use qr::{image_routes, qr_public_routes, qr_routes};
pub use redirect::{RedirectService, redirect_routes};
pub use stats::dashboard_routes;
