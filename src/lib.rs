//! qrify - QR code generation and scan tracking service
//!
//! This library provides the core functionality for the qrify service:
//! dynamic short-link QR codes, buffered scan analytics, plan-gated
//! accounts, and Razorpay billing.
//!
//! # Features
//! - **server**: HTTP server mode (default)
//! - **cli**: Command-line interface
//!
//! # Architecture
//! - `cache`: Composite cache (Bloom filter + negative cache + object cache)
//! - `storage`: SeaORM storage backend and data models
//! - `analytics`: Scan counting and detailed scan logging
//! - `api`: HTTP services, middleware, and wire types
//! - `services`: Business logic shared between HTTP and CLI
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging initialization

pub mod analytics;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
