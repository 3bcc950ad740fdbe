//! Optimistic-concurrency writes for task rows.
//!
//! Every write is one conditional statement guarded by
//! `id = ? AND user_id = ? AND is_deleted = false`; the store bumps `version`
//! inside that same statement. Nothing here reads a row and then writes it.

use std::sync::Arc;

use chrono::Utc;
use tasklane_core::{TaskChanges, TaskError, TaskId, TaskResult, UserId};
use tracing::debug;

use crate::store::{RowGuard, TaskMutation, TaskStore};

#[derive(Clone)]
pub struct VersionedUpdater {
    store: Arc<dyn TaskStore>,
}

impl VersionedUpdater {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Apply `changes` to a live task owned by `owner`, returning the new version.
    ///
    /// A missing, deleted, or foreign row yields `NotOwnedOrMissing`. When
    /// `changes.expected_version` is set and a live owned row exists with a
    /// different version, the result is `VersionConflict`.
    pub async fn update(&self, id: TaskId, owner: UserId, changes: TaskChanges) -> TaskResult<u32> {
        let guard = RowGuard::new(id, owner);
        let expected = changes.expected_version;
        let outcome = self
            .store
            .update(&guard, &TaskMutation::Update(changes))
            .await?;

        if let Some(version) = outcome.version.filter(|_| outcome.rows_affected > 0) {
            debug!(task_id = %id, version, "task updated");
            return Ok(version);
        }

        match expected {
            // The guard failed on the version clause only if the caller still
            // owns a live row; the re-check is owner-scoped so it leaks nothing.
            Some(expected) if self.store.find_owned(&guard).await?.is_some() => {
                Err(TaskError::VersionConflict { id, expected })
            }
            _ => Err(TaskError::NotOwnedOrMissing { id }),
        }
    }

    /// Soft-delete a live task owned by `owner`.
    pub async fn soft_delete(&self, id: TaskId, owner: UserId) -> TaskResult<()> {
        let guard = RowGuard::new(id, owner);
        let outcome = self
            .store
            .update(&guard, &TaskMutation::SoftDelete { at: Utc::now() })
            .await?;
        if outcome.rows_affected == 0 {
            return Err(TaskError::NotOwnedOrMissing { id });
        }
        debug!(task_id = %id, "task soft-deleted");
        Ok(())
    }
}
