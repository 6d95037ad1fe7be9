pub mod auth;
pub mod csrf;
pub mod request_id;

pub use auth::{AdminGate, AuthContext, AuthMethod, RequireAuth};
pub use csrf::CsrfGuard;
pub use request_id::RequestIdMiddleware;
