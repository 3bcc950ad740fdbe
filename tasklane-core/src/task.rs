//! Task entity, its public projection, and write payloads

use crate::{TaskId, Timestamp, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version assigned to a freshly inserted task.
pub const INITIAL_VERSION: u32 = 1;

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse from database or user input.
    ///
    /// Accepts `in progress` and `in-progress` as spellings of `in_progress`.
    pub fn from_db_str(s: &str) -> Result<Self, TaskStatusParseError> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(TaskStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid task status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ============================================================================
// ENTITIES
// ============================================================================

/// A task row as owned by the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_at: Option<NaiveDate>,
    pub version: u32,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
}

impl Task {
    /// Whether `user` owns this row and it has not been soft-deleted.
    pub fn is_live_for(&self, user: UserId) -> bool {
        self.user_id == user && !self.is_deleted
    }

    pub fn view(&self) -> TaskView {
        TaskView::from(self)
    }
}

/// Public projection of a task. This is what responses and cache entries carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub due_at: Option<NaiveDate>,
    pub version: u32,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            due_at: task.due_at,
            version: task.version,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            due_at: task.due_at,
            version: task.version,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

// ============================================================================
// WRITE PAYLOADS
// ============================================================================

/// Fields for a new task. The owner comes from the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_at: Option<NaiveDate>,
}

/// Fields written by an update.
///
/// `title`, `description` and `status` are always written. `due_at` is
/// written only when present. When `expected_version` is set the update
/// applies only if the stored version still matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_at: Option<NaiveDate>,
    pub expected_version: Option<u32>,
}

impl TaskChanges {
    /// Apply these changes to an in-memory row, bumping its version.
    pub fn apply_to(&self, task: &mut Task, now: Timestamp) {
        task.title = self.title.clone();
        task.description = self.description.clone();
        task.status = self.status;
        if let Some(due) = self.due_at {
            task.due_at = Some(due);
        }
        task.version += 1;
        task.updated_at = Some(now);
    }
}

/// Kind of committed write, carried on change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Updated,
    Deleted,
}

/// Notification published after a task write commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task_id: TaskId,
    #[serde(default)]
    pub version: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_task() -> Task {
        Task {
            id: TaskId::new(7),
            user_id: UserId::new(1),
            title: "Write report".to_string(),
            description: "Quarterly numbers".to_string(),
            status: TaskStatus::Pending,
            due_at: None,
            version: INITIAL_VERSION,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_status_accepts_spaced_spelling() {
        assert_eq!(
            TaskStatus::from_db_str("in progress"),
            Ok(TaskStatus::InProgress)
        );
        assert_eq!(
            TaskStatus::from_db_str("In_Progress"),
            Ok(TaskStatus::InProgress)
        );
        assert!(TaskStatus::from_db_str("archived").is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_view_hides_owner_and_deletion() {
        let json = serde_json::to_value(sample_task().view()).unwrap();
        assert!(json.get("user_id").is_none());
        assert!(json.get("is_deleted").is_none());
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn test_changes_keep_due_date_when_absent() {
        let mut task = sample_task();
        let due = NaiveDate::from_ymd_opt(2030, 1, 2).unwrap();
        task.due_at = Some(due);
        let changes = TaskChanges {
            title: "New".to_string(),
            description: "Desc".to_string(),
            status: TaskStatus::Completed,
            due_at: None,
            expected_version: None,
        };
        changes.apply_to(&mut task, Utc::now());
        assert_eq!(task.due_at, Some(due));
        assert_eq!(task.version, 2);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.updated_at.is_some());
    }

    #[test]
    fn test_is_live_for() {
        let mut task = sample_task();
        assert!(task.is_live_for(UserId::new(1)));
        assert!(!task.is_live_for(UserId::new(2)));
        task.is_deleted = true;
        assert!(!task.is_live_for(UserId::new(1)));
    }
}
