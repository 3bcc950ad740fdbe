//! Backing-store capabilities.
//!
//! The relational store is the system of record. These traits expose only
//! parameterized operations: callers describe *which* rows with typed
//! predicates ([`TaskQuery`], [`RowGuard`]) and never hand over query text.

use ::async_trait::async_trait;
use tasklane_core::{
    Activity, ListingQuery, NewUser, StoreResult, Task, TaskChanges, TaskDraft, TaskId,
    Timestamp, User, UserId,
};

/// Rows a read should return. Soft-deleted rows are never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskQuery {
    ById(TaskId),
    Listing(ListingQuery),
}

/// Write predicate: `id = ? AND user_id = ? AND is_deleted = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowGuard {
    pub id: TaskId,
    pub owner: UserId,
}

impl RowGuard {
    pub fn new(id: TaskId, owner: UserId) -> Self {
        Self { id, owner }
    }

    /// Whether `task` satisfies this predicate.
    pub fn admits(&self, task: &Task) -> bool {
        task.id == self.id && task.is_live_for(self.owner)
    }
}

/// A conditional single-statement mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMutation {
    /// Write fields and set `version = version + 1`. With
    /// `changes.expected_version` the predicate also requires `version = expected`.
    Update(TaskChanges),
    /// Set `is_deleted = true` and `deleted_at`.
    SoftDelete { at: Timestamp },
}

/// Result of a conditional mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub rows_affected: u64,
    /// Version after the statement, when a row was affected.
    pub version: Option<u32>,
}

impl MutationOutcome {
    pub fn none() -> Self {
        Self {
            rows_affected: 0,
            version: None,
        }
    }

    pub fn applied(version: u32) -> Self {
        Self {
            rows_affected: 1,
            version: Some(version),
        }
    }
}

/// Task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Live rows matching `query`, in the query's order.
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>>;

    /// Insert a new row with version 1.
    async fn insert(&self, owner: UserId, draft: &TaskDraft) -> StoreResult<Task>;

    /// Apply `mutation` to the row matching `guard` in one atomic statement.
    async fn update(&self, guard: &RowGuard, mutation: &TaskMutation)
        -> StoreResult<MutationOutcome>;

    /// The live row matching `guard`, if any. Owner-scoped, so it reveals
    /// nothing about rows the caller does not own.
    async fn find_owned(&self, guard: &RowGuard) -> StoreResult<Option<Task>>;
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an inactive account. A taken email yields `StoreError::Duplicate`.
    async fn insert_user(&self, user: &NewUser) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Activate the account holding `token` and clear the token.
    async fn activate_user(&self, token: &str) -> StoreResult<Option<UserId>>;

    /// Append an activity row, superseding earlier rows for the same pair.
    async fn record_activity(&self, user: UserId, activity: Activity) -> StoreResult<()>;

    /// Remember an issued login token by digest.
    async fn record_session(&self, user: UserId, token_digest: &str) -> StoreResult<()>;
}
