//! Cache layer: the [`CacheStore`] capability, its backends, and the
//! [`TaskCache`] read-through/write-invalidate layer.
//!
//! The cache is never the system of record. Every lookup yields a
//! [`CacheLookup`], and anything other than a decodable `Hit` sends the read
//! to the backing store.

pub mod memory;
pub mod redis_backend;
pub mod task_cache;
pub mod traits;

pub use memory::InMemoryCacheStore;
pub use redis_backend::RedisCacheStore;
pub use task_cache::{
    listing_key, task_key, TaskCache, TaskCacheConfig, LISTING_KEY_PREFIX, NOTIFICATION_CHANNEL,
    TASK_KEY_PREFIX,
};
pub use traits::{CacheLookup, CacheStats, CacheStatsSnapshot, CacheStore};
