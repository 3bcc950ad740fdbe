//! Tasklane Storage - Store and Cache Capabilities
//!
//! Defines the backing-store traits, the best-effort cache capability and its
//! backends, the read-through [`TaskCache`], and the optimistic-concurrency
//! [`VersionedUpdater`]. The Postgres store lives in tasklane-api.

pub mod cache;
pub mod memory;
pub mod store;
pub mod versioned;

pub use cache::{
    listing_key, task_key, CacheLookup, CacheStats, CacheStatsSnapshot, CacheStore,
    InMemoryCacheStore, RedisCacheStore, TaskCache, TaskCacheConfig, LISTING_KEY_PREFIX,
    NOTIFICATION_CHANNEL, TASK_KEY_PREFIX,
};
pub use memory::{InMemoryTaskStore, InMemoryUserStore};
pub use store::{MutationOutcome, RowGuard, TaskMutation, TaskQuery, TaskStore, UserStore};
pub use versioned::VersionedUpdater;
