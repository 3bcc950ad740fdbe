//! User accounts and the activity log.

use crate::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub activation_token: Option<String>,
    pub verified_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Fields for a new, not yet activated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub activation_token: String,
}

/// Something a user did that is worth an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    Registered,
    AccountActivated,
    LoggedIn,
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
}

impl Activity {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Activity::Registered => "New User Register",
            Activity::AccountActivated => "Account Activated",
            Activity::LoggedIn => "Logged In",
            Activity::TaskCreated => "New Task Created",
            Activity::TaskUpdated => "Task Updated",
            Activity::TaskDeleted => "Task Deleted",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// One activity-log row. Recording an activity supersedes earlier rows for
/// the same user and activity, so at most one row per pair is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLogEntry {
    pub user_id: UserId,
    pub activity: Activity,
    pub superseded: bool,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}
