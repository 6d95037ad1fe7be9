//! 组合缓存：Bloom 存在性过滤 + 负缓存 + moka 对象缓存
//!
//! redirect 热路径只和 `CompositeCacheTrait` 打交道。

pub mod bloom;
pub mod composite;
pub mod negative;
pub mod null;
pub mod object;
mod traits;

pub use composite::CompositeCache;
pub use null::NullCache;
pub use traits::{CacheResult, CompositeCacheTrait};
