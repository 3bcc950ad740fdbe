//! Process-local cache backend.

use std::future::ready;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{BoxStream, StreamExt};
use tasklane_core::CacheResult;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use super::traits::CacheStore;

const CHANNEL_CAPACITY: usize = 256;

/// Every this many writes, expired entries are swept.
const SWEEP_EVERY_SETS: u64 = 256;

/// A write later than this since the last sweep also triggers one.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory [`CacheStore`] with lazy TTL expiry and broadcast pub/sub.
///
/// Expired entries behave as misses and are evicted when touched. Writes
/// also sweep the whole map every [`SWEEP_EVERY_SETS`] calls or once
/// [`SWEEP_INTERVAL`] has passed, so keys that are never read again do not
/// pile up. Uses `tokio::time::Instant`, so paused-clock tests control expiry.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    sets: AtomicU64,
    last_sweep: Mutex<Option<Instant>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn sweep_due(&self, now: Instant) -> bool {
        let nth = self.sets.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_SETS
            == SWEEP_EVERY_SETS - 1;
        let Ok(mut last) = self.last_sweep.lock() else {
            return nth;
        };
        let stale = last.is_some_and(|t| now.duration_since(t) >= SWEEP_INTERVAL);
        if last.is_none() || nth || stale {
            *last = Some(now);
        }
        nth || stale
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        if self.sweep_due(now) {
            let removed = self.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired cache entries");
            }
        }
        let entry = Entry {
            value,
            expires_at: now + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()> {
        // No subscribers is not an error.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<BoxStream<'static, Vec<u8>>> {
        let receiver = self.sender(channel).subscribe();
        Ok(BroadcastStream::new(receiver)
            .filter_map(|message| ready(message.ok()))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryCacheStore::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_entries_that_are_never_read() {
        let cache = InMemoryCacheStore::new();
        let short = Duration::from_secs(1);
        for i in 0..1000 {
            cache.set(&format!("tasks:listing:{i}"), vec![0], short).await.unwrap();
        }
        assert_eq!(cache.len(), 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for i in 0..10 {
            cache.set(&format!("tasks:listing:new:{i}"), vec![1], short).await.unwrap();
        }
        assert_eq!(cache.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_nth_write_sweeps_without_time_passing_a_full_interval() {
        let cache = InMemoryCacheStore::new();
        cache.set("warm", vec![0], Duration::from_secs(60)).await.unwrap();
        for i in 0..10 {
            cache.set(&format!("gone:{i}"), vec![0], Duration::from_millis(10)).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        for i in 0..SWEEP_EVERY_SETS {
            cache.set(&format!("fresh:{i}"), vec![0], Duration::from_secs(60)).await.unwrap();
        }
        assert!(!cache.contains("gone:0"));
        assert_eq!(cache.len() as u64, 1 + SWEEP_EVERY_SETS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_live_entries() {
        let cache = InMemoryCacheStore::new();
        cache.set("short", vec![0], Duration::from_secs(1)).await.unwrap();
        cache.set("long", vec![0], Duration::from_secs(600)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains("long"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_prefix_only_touches_prefix() {
        let cache = InMemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        cache.set("tasks:listing:a", vec![1], ttl).await.unwrap();
        cache.set("tasks:listing:b", vec![2], ttl).await.unwrap();
        cache.set("tasks:id:1", vec![3], ttl).await.unwrap();

        assert_eq!(cache.delete_by_prefix("tasks:listing:").await.unwrap(), 2);
        assert!(cache.contains("tasks:id:1"));
        assert!(!cache.contains("tasks:listing:a"));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let cache = InMemoryCacheStore::new();
        let mut stream = cache.subscribe("todo.notifications").await.unwrap();
        cache
            .publish("todo.notifications", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let cache = InMemoryCacheStore::new();
        assert!(cache.publish("nobody", vec![1]).await.is_ok());
    }
}
