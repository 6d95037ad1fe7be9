//! System-level utilities
//!
//! Currently only logging initialization lives here.

pub mod logging;

pub use logging::init_logging;
