mod r#impl;
mod structs;
pub mod types;

pub use r#impl::{get_config, init_config, replace_config};
pub use structs::*;
pub use types::TS_EXPORT_PATH;
