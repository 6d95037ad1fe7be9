//! Service layer for business logic
//!
//! This module provides unified business logic that can be shared between
//! different interfaces (HTTP API, CLI).

mod billing_service;
pub mod geoip;
mod qr_service;
pub mod render;
mod stats_service;
pub mod user_agent_store;
mod user_service;

pub use billing_service::*;
pub use geoip::{GeoInfo, GeoIpLookup, GeoIpProvider};
pub use qr_service::*;
pub use stats_service::*;
pub use user_service::*;
