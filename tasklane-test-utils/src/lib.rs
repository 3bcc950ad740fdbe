//! Tasklane Test Utilities
//!
//! Centralized test infrastructure for the Tasklane workspace:
//! - Fault-injecting and instrumented store/cache wrappers
//! - Proptest generators for tasks and listing queries
//! - Test fixtures for common scenarios
//! - Custom assertions for task errors

// Re-export in-memory backends from their source crate
pub use tasklane_storage::{
    CacheStore, InMemoryCacheStore, InMemoryTaskStore, InMemoryUserStore, TaskCache,
    TaskCacheConfig, TaskStore, UserStore,
};

// Re-export core types for convenience
pub use tasklane_core::{
    CacheError, CacheResult, ListingParams, ListingQuery, SortColumn, SortDirection, StoreError,
    StoreResult, Task, TaskChanges, TaskDraft, TaskError, TaskId, TaskInput, TaskResult,
    TaskStatus, TaskView, UserId,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

pub mod mocks {
    //! Wrappers that fail or count on demand.

    use super::*;
    use futures_util::stream::BoxStream;
    use tasklane_storage::{MutationOutcome, RowGuard, TaskMutation, TaskQuery};

    /// Cache that can be switched into failing reads and/or writes.
    #[derive(Debug, Default)]
    pub struct FlakyCacheStore {
        inner: InMemoryCacheStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FlakyCacheStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// A cache where every operation fails.
        pub fn down() -> Self {
            let cache = Self::new();
            cache.set_fail_reads(true);
            cache.set_fail_writes(true);
            cache
        }

        pub fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn inner(&self) -> &InMemoryCacheStore {
            &self.inner
        }

        fn check(&self, flag: &AtomicBool, operation: &str) -> CacheResult<()> {
            if flag.load(Ordering::SeqCst) {
                Err(CacheError::unavailable(operation, "injected failure"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheStore for FlakyCacheStore {
        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            self.check(&self.fail_reads, "get")?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
            self.check(&self.fail_writes, "set")?;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.check(&self.fail_writes, "delete")?;
            self.inner.delete(key).await
        }

        async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
            self.check(&self.fail_writes, "delete_by_prefix")?;
            self.inner.delete_by_prefix(prefix).await
        }

        async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()> {
            self.check(&self.fail_writes, "publish")?;
            self.inner.publish(channel, payload).await
        }

        async fn subscribe(&self, channel: &str) -> CacheResult<BoxStream<'static, Vec<u8>>> {
            self.check(&self.fail_reads, "subscribe")?;
            self.inner.subscribe(channel).await
        }
    }

    /// Task store that counts reads and can fail or stall on demand.
    #[derive(Debug, Default)]
    pub struct InstrumentedTaskStore {
        inner: InMemoryTaskStore,
        queries: AtomicU64,
        unavailable: AtomicBool,
        query_delay_ms: AtomicU64,
    }

    impl InstrumentedTaskStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn inner(&self) -> &InMemoryTaskStore {
            &self.inner
        }

        /// Number of `query` calls so far.
        pub fn query_count(&self) -> u64 {
            self.queries.load(Ordering::SeqCst)
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Make every `query` sleep before answering.
        pub fn set_query_delay(&self, delay: Duration) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.query_delay_ms.store(millis, Ordering::SeqCst);
        }

        fn check(&self, operation: &str) -> StoreResult<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(StoreError::unavailable(operation, "injected failure"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TaskStore for InstrumentedTaskStore {
        async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let delay = self.query_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.check("query")?;
            self.inner.query(query).await
        }

        async fn insert(&self, owner: UserId, draft: &TaskDraft) -> StoreResult<Task> {
            self.check("insert")?;
            self.inner.insert(owner, draft).await
        }

        async fn update(
            &self,
            guard: &RowGuard,
            mutation: &TaskMutation,
        ) -> StoreResult<MutationOutcome> {
            self.check("update")?;
            self.inner.update(guard, mutation).await
        }

        async fn find_owned(&self, guard: &RowGuard) -> StoreResult<Option<Task>> {
            self.check("find_owned")?;
            self.inner.find_owned(guard).await
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for task inputs and listing queries.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Completed),
        ]
    }

    pub fn arb_sort_column() -> impl Strategy<Value = SortColumn> {
        prop_oneof![
            Just(SortColumn::Id),
            Just(SortColumn::DueAt),
            Just(SortColumn::CreatedAt),
            Just(SortColumn::UpdatedAt),
        ]
    }

    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2035, 1u32..=12, 1u32..=28)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    /// A normalized query with every field in range.
    pub fn arb_listing_query() -> impl Strategy<Value = ListingQuery> {
        (
            proptest::option::of(arb_task_status()),
            proptest::option::of(arb_date()),
            proptest::option::of(arb_date()),
            arb_sort_column(),
            any::<bool>(),
            1u32..20,
            1u32..=tasklane_core::MAX_PAGE_SIZE,
        )
            .prop_map(
                |(status, due_after, due_before, sort_by, asc, page, page_size)| ListingQuery {
                    status,
                    due_after,
                    due_before,
                    sort_by,
                    direction: if asc {
                        SortDirection::Asc
                    } else {
                        SortDirection::Desc
                    },
                    page,
                    page_size,
                },
            )
    }

    pub fn arb_task_draft() -> impl Strategy<Value = TaskDraft> {
        (
            "[a-zA-Z][a-zA-Z0-9 ]{0,30}",
            "[a-zA-Z0-9 ]{1,60}",
            arb_task_status(),
            proptest::option::of(arb_date()),
        )
            .prop_map(|(title, description, status, due_at)| TaskDraft {
                title,
                description,
                status,
                due_at,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    pub fn draft(title: &str, status: TaskStatus) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: format!("{title} description"),
            status,
            due_at: None,
        }
    }

    pub fn changes(title: &str, status: TaskStatus) -> TaskChanges {
        TaskChanges {
            title: title.to_string(),
            description: format!("{title} description"),
            status,
            due_at: None,
            expected_version: None,
        }
    }

    /// A task cache over instrumented in-memory backends, with handles to both.
    pub struct CacheHarness {
        pub store: Arc<mocks::InstrumentedTaskStore>,
        pub cache: Arc<mocks::FlakyCacheStore>,
        pub tasks: Arc<TaskCache>,
    }

    impl CacheHarness {
        pub fn new() -> Self {
            let store = Arc::new(mocks::InstrumentedTaskStore::new());
            let cache = Arc::new(mocks::FlakyCacheStore::new());
            let tasks = Arc::new(TaskCache::new(
                store.clone(),
                cache.clone() as Arc<dyn CacheStore>,
                TaskCacheConfig::default(),
            ));
            Self {
                store,
                cache,
                tasks,
            }
        }
    }

    impl Default for CacheHarness {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for task-specific error variants.

    use super::*;

    /// Assert that a TaskResult is the collapsed not-owned-or-missing error.
    #[track_caller]
    pub fn assert_not_owned_or_missing<T: std::fmt::Debug>(result: &TaskResult<T>) {
        match result {
            Err(TaskError::NotOwnedOrMissing { .. }) => {}
            other => panic!("Expected NotOwnedOrMissing, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TaskResult<T>) {
        match result {
            Err(TaskError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
