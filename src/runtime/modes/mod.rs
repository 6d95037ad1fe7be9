//! Execution modes
//!
//! Server mode runs the HTTP server; CLI subcommands are handled by
//! `crate::cli` before this module is reached.

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "server")]
pub use server::run_server;
