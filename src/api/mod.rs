//! HTTP API layer: routes, middleware, JWT, and wire types

pub mod constants;
pub mod jwt;
pub mod middleware;
pub mod services;
pub mod types;
