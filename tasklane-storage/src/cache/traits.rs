//! Cache backend trait and lookup result.
//!
//! The cache is a best-effort key/value byte store. Nothing stored here is
//! authoritative: callers treat every error as "go to the store".

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tasklane_core::{CacheError, CacheResult};

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be safe for concurrent use without external locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the bytes stored under `key`. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64>;

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()>;

    /// Messages published on `channel` after this call returns.
    async fn subscribe(&self, channel: &str) -> CacheResult<BoxStream<'static, Vec<u8>>>;
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Vec<u8>),
    Miss,
    /// The cache could not answer. Always handled by reading the store.
    Unavailable(CacheError),
}

impl From<CacheResult<Option<Vec<u8>>>> for CacheLookup {
    fn from(result: CacheResult<Option<Vec<u8>>>) -> Self {
        match result {
            Ok(Some(bytes)) => CacheLookup::Hit(bytes),
            Ok(None) => CacheLookup::Miss,
            Err(e) => CacheLookup::Unavailable(e),
        }
    }
}

/// Running counters for a cache consumer.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    unavailable: AtomicU64,
    invalidation_failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub unavailable: u64,
    pub invalidation_failures: u64,
}

impl CacheStats {
    pub fn record(&self, lookup: &CacheLookup) {
        let counter = match lookup {
            CacheLookup::Hit(_) => &self.hits,
            CacheLookup::Miss => &self.misses,
            CacheLookup::Unavailable(_) => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation_failure(&self) {
        self.invalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Calculate the hit rate (0.0 to 1.0). Unavailable lookups count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.unavailable;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_from_result() {
        assert_eq!(CacheLookup::from(Ok(Some(vec![1]))), CacheLookup::Hit(vec![1]));
        assert_eq!(CacheLookup::from(Ok(None)), CacheLookup::Miss);
        let err = CacheError::unavailable("get", "refused");
        assert_eq!(
            CacheLookup::from(Err(err.clone())),
            CacheLookup::Unavailable(err)
        );
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::default();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
        stats.record(&CacheLookup::Hit(vec![]));
        stats.record(&CacheLookup::Miss);
        stats.record(&CacheLookup::Unavailable(CacheError::unavailable("get", "x")));
        stats.record(&CacheLookup::Hit(vec![]));
        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert!((snap.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
