pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

pub use error::CacheError;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use store::{CacheStatsSnapshot, CacheStore, CacheTtls, get_json, set_json};
