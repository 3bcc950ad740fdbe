//! Read-through, write-invalidate cache in front of the task store.
//!
//! Reads try the cache, fall back to the store on any miss or cache failure,
//! and populate the cache best-effort. Writes go through [`VersionedUpdater`]
//! and, once committed, drop the task's entry and every listing entry.
//!
//! A populate that races a write is handled with an invalidation generation:
//! writers bump it before deleting keys, readers compare it before and after
//! populating and delete their own entry if it moved.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tasklane_core::{
    ListingQuery, TaskChanges, TaskDraft, TaskError, TaskEvent, TaskEventKind, TaskId,
    TaskResult, TaskView, UserId,
};
use tracing::{debug, error, warn};

use super::traits::{CacheLookup, CacheStats, CacheStatsSnapshot, CacheStore};
use crate::store::{TaskQuery, TaskStore};
use crate::versioned::VersionedUpdater;

pub const TASK_KEY_PREFIX: &str = "tasks:id:";
pub const LISTING_KEY_PREFIX: &str = "tasks:listing:";
pub const NOTIFICATION_CHANNEL: &str = "todo.notifications";

pub fn task_key(id: TaskId) -> String {
    format!("{TASK_KEY_PREFIX}{id}")
}

pub fn listing_key(query: &ListingQuery) -> String {
    format!("{LISTING_KEY_PREFIX}{}", query.cache_key())
}

/// Configuration for [`TaskCache`].
#[derive(Debug, Clone)]
pub struct TaskCacheConfig {
    /// TTL for populated entries.
    pub entry_ttl: Duration,
    /// Channel that receives a [`TaskEvent`] after each committed write.
    pub notification_channel: String,
}

impl Default for TaskCacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(600),
            notification_channel: NOTIFICATION_CHANNEL.to_string(),
        }
    }
}

impl TaskCacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

pub struct TaskCache {
    store: Arc<dyn TaskStore>,
    cache: Arc<dyn CacheStore>,
    updater: VersionedUpdater,
    config: TaskCacheConfig,
    generation: AtomicU64,
    stats: CacheStats,
}

impl TaskCache {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cache: Arc<dyn CacheStore>,
        config: TaskCacheConfig,
    ) -> Self {
        Self {
            updater: VersionedUpdater::new(store.clone()),
            store,
            cache,
            config,
            generation: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &TaskCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// A live task by id. Deleted or absent tasks are `NotFound`.
    pub async fn get_by_id(&self, id: TaskId) -> TaskResult<TaskView> {
        let store = self.store.clone();
        self.read_through(&task_key(id), || async move {
            store
                .query(&TaskQuery::ById(id))
                .await?
                .into_iter()
                .next()
                .map(TaskView::from)
                .ok_or(TaskError::NotFound { id })
        })
        .await
    }

    /// One page of live tasks. An empty page is a successful empty list.
    pub async fn list(&self, query: &ListingQuery) -> TaskResult<Vec<TaskView>> {
        let store = self.store.clone();
        let store_query = TaskQuery::Listing(query.clone());
        self.read_through(&listing_key(query), || async move {
            Ok(store
                .query(&store_query)
                .await?
                .into_iter()
                .map(TaskView::from)
                .collect())
        })
        .await
    }

    async fn read_through<T, F, Fut>(&self, key: &str, fetch: F) -> TaskResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = TaskResult<T>>,
    {
        let lookup = CacheLookup::from(self.cache.get(key).await);
        self.stats.record(&lookup);

        let cache_healthy = match lookup {
            CacheLookup::Hit(bytes) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    if let Err(e) = self.cache.delete(key).await {
                        warn!(key = %key, error = %e, "Failed to delete undecodable cache entry");
                    }
                    true
                }
            },
            CacheLookup::Miss => true,
            CacheLookup::Unavailable(e) => {
                warn!(key = %key, error = %e, "Cache unavailable, reading from store");
                false
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let value = fetch().await?;
        if cache_healthy {
            self.populate(key, &value, generation).await;
        }
        Ok(value)
    }

    /// Store `value` under `key`, then drop it again if a write bumped the
    /// generation since `generation` was read.
    ///
    /// The set and the re-check are two awaits. If the caller's future is
    /// dropped between them (a request deadline firing, say), a value read
    /// before a concurrent write can stay cached until `entry_ttl` expires.
    /// Callers that cancel reads accept that window.
    async fn populate<T: Serialize>(&self, key: &str, value: &T, generation: u64) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes, self.config.entry_ttl).await {
            warn!(key = %key, error = %e, "Failed to populate cache");
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %key, "Write raced populate, dropping entry");
            if let Err(e) = self.cache.delete(key).await {
                warn!(key = %key, error = %e, "Failed to drop raced cache entry");
            }
        }
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub async fn create(&self, owner: UserId, draft: &TaskDraft) -> TaskResult<TaskView> {
        let task = self.store.insert(owner, draft).await?;
        self.after_write(TaskEventKind::Created, task.id, Some(task.version))
            .await;
        Ok(task.view())
    }

    /// Update a task owned by `owner`, returning its new version.
    pub async fn update(
        &self,
        id: TaskId,
        owner: UserId,
        changes: TaskChanges,
    ) -> TaskResult<u32> {
        let version = self.updater.update(id, owner, changes).await?;
        self.after_write(TaskEventKind::Updated, id, Some(version))
            .await;
        Ok(version)
    }

    pub async fn soft_delete(&self, id: TaskId, owner: UserId) -> TaskResult<()> {
        self.updater.soft_delete(id, owner).await?;
        self.after_write(TaskEventKind::Deleted, id, None).await;
        Ok(())
    }

    async fn after_write(&self, kind: TaskEventKind, id: TaskId, version: Option<u32>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidate(id).await;
        self.notify(TaskEvent {
            kind,
            task_id: id,
            version,
        })
        .await;
    }

    /// Drop the task's entry and every listing entry. Failure leaves stale
    /// entries until their TTL expires, so it is logged as a consistency risk.
    async fn invalidate(&self, id: TaskId) {
        let key = task_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            self.stats.record_invalidation_failure();
            error!(task_id = %id, key = %key, error = %e, "Cache invalidation failed; stale task entry may be served until TTL");
        }
        match self.cache.delete_by_prefix(LISTING_KEY_PREFIX).await {
            Ok(removed) => debug!(task_id = %id, removed, "Invalidated listing entries"),
            Err(e) => {
                self.stats.record_invalidation_failure();
                error!(task_id = %id, error = %e, "Cache invalidation failed; stale listings may be served until TTL");
            }
        }
    }

    async fn notify(&self, event: TaskEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize task event");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .publish(&self.config.notification_channel, payload)
            .await
        {
            warn!(task_id = %event.task_id, error = %e, "Failed to publish task event");
        }
    }
}
