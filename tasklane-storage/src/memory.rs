//! In-memory stores for development and testing.
//!
//! Each operation takes the table lock once, so every conditional mutation is
//! a single atomic step, the same guarantee a single SQL statement gives.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ::async_trait::async_trait;
use chrono::Utc;
use tasklane_core::{
    Activity, ActivityLogEntry, ListingQuery, NewUser, SortColumn, SortDirection, StoreError,
    StoreResult, Task, TaskDraft, TaskId, User, UserId, INITIAL_VERSION,
};

use crate::store::{MutationOutcome, RowGuard, TaskMutation, TaskQuery, TaskStore, UserStore};

fn lock<'a, T>(mutex: &'a Mutex<T>, operation: &str) -> StoreResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::unavailable(operation, "lock poisoned"))
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Default)]
struct TaskTable {
    rows: BTreeMap<TaskId, Task>,
    next_id: i64,
}

/// Task store backed by a locked map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    table: Arc<Mutex<TaskTable>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw row access, including soft-deleted rows.
    pub fn row(&self, id: TaskId) -> Option<Task> {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.rows.get(&id).cloned())
    }

    pub fn row_count(&self) -> usize {
        self.table.lock().map(|t| t.rows.len()).unwrap_or(0)
    }
}

/// Postgres ordering: NULL sorts after every value ascending.
fn cmp_nullable<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn listing_order(query: &ListingQuery, a: &Task, b: &Task) -> Ordering {
    let by_column = match query.sort_by {
        SortColumn::Id => Ordering::Equal,
        SortColumn::DueAt => cmp_nullable(&a.due_at, &b.due_at),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::UpdatedAt => cmp_nullable(&a.updated_at, &b.updated_at),
    };
    let ordering = by_column.then(a.id.cmp(&b.id));
    match query.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn matches_listing(query: &ListingQuery, task: &Task) -> bool {
    if task.is_deleted {
        return false;
    }
    if query.status.is_some_and(|s| s != task.status) {
        return false;
    }
    if let Some(after) = query.due_after {
        if !task.due_at.is_some_and(|d| d >= after) {
            return false;
        }
    }
    if let Some(before) = query.due_before {
        if !task.due_at.is_some_and(|d| d <= before) {
            return false;
        }
    }
    true
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let table = lock(&self.table, "query_tasks")?;
        match query {
            TaskQuery::ById(id) => Ok(table
                .rows
                .get(id)
                .filter(|t| !t.is_deleted)
                .cloned()
                .into_iter()
                .collect()),
            TaskQuery::Listing(listing) => {
                let mut rows: Vec<Task> = table
                    .rows
                    .values()
                    .filter(|t| matches_listing(listing, t))
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| listing_order(listing, a, b));
                let offset = usize::try_from(listing.offset()).unwrap_or(usize::MAX);
                let limit = usize::try_from(listing.limit()).unwrap_or(0);
                Ok(rows.into_iter().skip(offset).take(limit).collect())
            }
        }
    }

    async fn insert(&self, owner: UserId, draft: &TaskDraft) -> StoreResult<Task> {
        let mut table = lock(&self.table, "insert_task")?;
        table.next_id += 1;
        let task = Task {
            id: TaskId::new(table.next_id),
            user_id: owner,
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: draft.status,
            due_at: draft.due_at,
            version: INITIAL_VERSION,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        };
        table.rows.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        guard: &RowGuard,
        mutation: &TaskMutation,
    ) -> StoreResult<MutationOutcome> {
        let mut table = lock(&self.table, "update_task")?;
        let Some(task) = table.rows.get_mut(&guard.id).filter(|t| guard.admits(t)) else {
            return Ok(MutationOutcome::none());
        };
        match mutation {
            TaskMutation::Update(changes) => {
                if changes.expected_version.is_some_and(|v| v != task.version) {
                    return Ok(MutationOutcome::none());
                }
                changes.apply_to(task, Utc::now());
            }
            TaskMutation::SoftDelete { at } => {
                task.is_deleted = true;
                task.deleted_at = Some(*at);
            }
        }
        Ok(MutationOutcome::applied(task.version))
    }

    async fn find_owned(&self, guard: &RowGuard) -> StoreResult<Option<Task>> {
        let table = lock(&self.table, "find_owned_task")?;
        Ok(table
            .rows
            .get(&guard.id)
            .filter(|t| guard.admits(t))
            .cloned())
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Default)]
struct UserTable {
    users: BTreeMap<UserId, User>,
    activity: Vec<ActivityLogEntry>,
    sessions: Vec<(UserId, String)>,
    next_id: i64,
}

/// User store backed by a locked map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    table: Arc<Mutex<UserTable>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activity rows for `user`, oldest first.
    pub fn activity_for(&self, user: UserId) -> Vec<ActivityLogEntry> {
        self.table
            .lock()
            .map(|t| {
                t.activity
                    .iter()
                    .filter(|e| e.user_id == user)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn session_count(&self, user: UserId) -> usize {
        self.table
            .lock()
            .map(|t| t.sessions.iter().filter(|(u, _)| *u == user).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert_user(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut table = lock(&self.table, "insert_user")?;
        if table.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Duplicate {
                field: "email".to_string(),
            });
        }
        table.next_id += 1;
        let user = User {
            id: UserId::new(table.next_id),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            active: false,
            activation_token: Some(new_user.activation_token.clone()),
            verified_at: None,
            created_at: Utc::now(),
        };
        table.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let table = lock(&self.table, "find_user_by_email")?;
        Ok(table.users.values().find(|u| u.email == email).cloned())
    }

    async fn activate_user(&self, token: &str) -> StoreResult<Option<UserId>> {
        let mut table = lock(&self.table, "activate_user")?;
        let Some(user) = table
            .users
            .values_mut()
            .find(|u| u.activation_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        user.active = true;
        user.activation_token = None;
        user.verified_at = Some(Utc::now());
        Ok(Some(user.id))
    }

    async fn record_activity(&self, user: UserId, activity: Activity) -> StoreResult<()> {
        let mut table = lock(&self.table, "record_activity")?;
        let now = Utc::now();
        for entry in table
            .activity
            .iter_mut()
            .filter(|e| e.user_id == user && e.activity == activity && !e.superseded)
        {
            entry.superseded = true;
            entry.updated_at = Some(now);
        }
        table.activity.push(ActivityLogEntry {
            user_id: user,
            activity,
            superseded: false,
            created_at: now,
            updated_at: None,
        });
        Ok(())
    }

    async fn record_session(&self, user: UserId, token_digest: &str) -> StoreResult<()> {
        let mut table = lock(&self.table, "record_session")?;
        table.sessions.push((user, token_digest.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tasklane_core::{TaskChanges, TaskStatus};

    fn draft(title: &str, status: TaskStatus, due: Option<NaiveDate>) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: "d".to_string(),
            status,
            due_at: due,
        }
    }

    fn changes(expected_version: Option<u32>) -> TaskChanges {
        TaskChanges {
            title: "changed".to_string(),
            description: "d".to_string(),
            status: TaskStatus::Completed,
            due_at: None,
            expected_version,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_listing_filters_and_sorts() -> Result<(), String> {
        let store = InMemoryTaskStore::new();
        let owner = UserId::new(1);
        for (i, status) in [TaskStatus::Pending, TaskStatus::Completed, TaskStatus::Pending]
            .into_iter()
            .enumerate()
        {
            store
                .insert(owner, &draft(&format!("t{i}"), status, Some(date(i as u32 + 1))))
                .await
                .map_err(|e| e.to_string())?;
        }

        let pending = ListingQuery::default().with_status(TaskStatus::Pending);
        let rows = store
            .query(&TaskQuery::Listing(pending))
            .await
            .map_err(|e| e.to_string())?;
        let ids: Vec<i64> = rows.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![3, 1]);

        let ranged = ListingQuery {
            due_after: Some(date(2)),
            due_before: Some(date(3)),
            sort_by: SortColumn::DueAt,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        let rows = store
            .query(&TaskQuery::Listing(ranged))
            .await
            .map_err(|e| e.to_string())?;
        let ids: Vec<i64> = rows.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_paginates() -> Result<(), String> {
        let store = InMemoryTaskStore::new();
        for i in 0..5 {
            store
                .insert(UserId::new(1), &draft(&format!("t{i}"), TaskStatus::Pending, None))
                .await
                .map_err(|e| e.to_string())?;
        }
        let page_two = ListingQuery {
            page: 2,
            page_size: 2,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        let rows = store
            .query(&TaskQuery::Listing(page_two))
            .await
            .map_err(|e| e.to_string())?;
        let ids: Vec<i64> = rows.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![3, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_requires_owner_and_live_row() -> Result<(), String> {
        let store = InMemoryTaskStore::new();
        let task = store
            .insert(UserId::new(1), &draft("a", TaskStatus::Pending, None))
            .await
            .map_err(|e| e.to_string())?;

        let stranger = RowGuard::new(task.id, UserId::new(2));
        let outcome = store
            .update(&stranger, &TaskMutation::Update(changes(None)))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(outcome, MutationOutcome::none());

        let owner = RowGuard::new(task.id, UserId::new(1));
        let outcome = store
            .update(&owner, &TaskMutation::Update(changes(Some(1))))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(outcome, MutationOutcome::applied(2));

        let stale = store
            .update(&owner, &TaskMutation::Update(changes(Some(1))))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(stale.rows_affected, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_soft_delete_hides_row_but_keeps_it() -> Result<(), String> {
        let store = InMemoryTaskStore::new();
        let task = store
            .insert(UserId::new(1), &draft("a", TaskStatus::Pending, None))
            .await
            .map_err(|e| e.to_string())?;
        let guard = RowGuard::new(task.id, UserId::new(1));
        store
            .update(&guard, &TaskMutation::SoftDelete { at: Utc::now() })
            .await
            .map_err(|e| e.to_string())?;

        let visible = store
            .query(&TaskQuery::ById(task.id))
            .await
            .map_err(|e| e.to_string())?;
        assert!(visible.is_empty());
        let row = store.row(task.id).ok_or("row was physically removed")?;
        assert!(row.is_deleted);
        assert!(row.deleted_at.is_some());
        assert_eq!(row.version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() -> Result<(), String> {
        let store = InMemoryUserStore::new();
        let user = NewUser {
            email: "a@example.com".to_string(),
            password_hash: "h".to_string(),
            activation_token: "tok".to_string(),
        };
        store.insert_user(&user).await.map_err(|e| e.to_string())?;
        let err = store.insert_user(&user).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_activation_clears_token() -> Result<(), String> {
        let store = InMemoryUserStore::new();
        let user = store
            .insert_user(&NewUser {
                email: "a@example.com".to_string(),
                password_hash: "h".to_string(),
                activation_token: "tok".to_string(),
            })
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(
            store.activate_user("tok").await.map_err(|e| e.to_string())?,
            Some(user.id)
        );
        assert_eq!(store.activate_user("tok").await.map_err(|e| e.to_string())?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_activity_supersedes_previous_entry() -> Result<(), String> {
        let store = InMemoryUserStore::new();
        let user = UserId::new(1);
        store
            .record_activity(user, Activity::LoggedIn)
            .await
            .map_err(|e| e.to_string())?;
        store
            .record_activity(user, Activity::LoggedIn)
            .await
            .map_err(|e| e.to_string())?;
        store
            .record_activity(user, Activity::TaskCreated)
            .await
            .map_err(|e| e.to_string())?;

        let log = store.activity_for(user);
        assert_eq!(log.len(), 3);
        let current: Vec<_> = log.iter().filter(|e| !e.superseded).collect();
        assert_eq!(current.len(), 2);
        assert!(log[0].superseded);
        Ok(())
    }
}
