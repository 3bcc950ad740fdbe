//! Field-level input validation for tasks and credentials.

use crate::listing::DATE_FORMAT;
use crate::task::{TaskChanges, TaskDraft, TaskStatus};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

static PASSWORD_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%\-$@]{5,20}$").ok());

fn matches(pattern: &Lazy<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// Field name to message. The first message recorded for a field wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(value)` if nothing was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", joined.join(", "))
    }
}

fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

// ============================================================================
// TASK INPUT
// ============================================================================

/// Task fields as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub due_at: Option<String>,
    /// Optimistic-concurrency guard for updates.
    #[serde(default)]
    pub version: Option<u32>,
}

struct CheckedTask {
    title: String,
    description: String,
    status: TaskStatus,
    due_at: Option<NaiveDate>,
}

impl TaskInput {
    fn check(&self, today: Option<NaiveDate>) -> Result<CheckedTask, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check(not_blank(&self.title), "title", "Please, fill the title field");
        errors.check(
            not_blank(&self.description),
            "description",
            "Please, fill the description field",
        );
        errors.check(not_blank(&self.status), "status", "Please, fill the status field");

        let status = TaskStatus::from_db_str(&self.status).ok();
        if !errors.has("status") {
            errors.check(status.is_some(), "status", "Invalid Status Input");
        }

        let mut due_at = None;
        if let Some(raw) = self.due_at.as_deref().filter(|s| not_blank(s)) {
            match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
                Ok(date) => {
                    if let Some(today) = today {
                        errors.check(date > today, "due_at", "Due date must be a future date");
                    }
                    due_at = Some(date);
                }
                Err(_) => errors.add("due_at", "Incorrect format. Expected format: YYYY-MM-DD"),
            }
        }

        errors.into_result(()).map(|()| CheckedTask {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            status: status.unwrap_or_default(),
            due_at,
        })
    }

    /// Validate for creation. The due date, if any, must lie after `today`.
    pub fn into_draft(self, today: NaiveDate) -> Result<TaskDraft, FieldErrors> {
        let checked = self.check(Some(today))?;
        Ok(TaskDraft {
            title: checked.title,
            description: checked.description,
            status: checked.status,
            due_at: checked.due_at,
        })
    }

    /// Validate for update. Past due dates are allowed.
    pub fn into_changes(self) -> Result<TaskChanges, FieldErrors> {
        let expected_version = self.version;
        let checked = self.check(None)?;
        Ok(TaskChanges {
            title: checked.title,
            description: checked.description,
            status: checked.status,
            due_at: checked.due_at,
            expected_version,
        })
    }
}

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Login or registration payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub passw: String,
    #[serde(default, rename = "repeatPassword")]
    pub repeat_password: String,
}

impl Credentials {
    /// Shape checks shared by login and registration.
    pub fn validate_login(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check(not_blank(&self.email), "email", "Please, fill the email field");
        errors.check(
            not_blank(&self.passw),
            "password",
            "Please, fill the password field",
        );
        if !errors.has("password") {
            errors.check(
                matches(&PASSWORD_PATTERN, &self.passw),
                "password",
                "Password Should contain Alphanumeric char and Special char (._%-$@) only between 5 to 20 char",
            );
        }
        if !errors.has("email") {
            errors.check(
                matches(&EMAIL_PATTERN, self.email.trim()),
                "email",
                "Invalid Email Format",
            );
        }
        errors
    }

    /// Login checks plus the repeated password. Email uniqueness is checked by the store.
    pub fn validate_registration(&self) -> FieldErrors {
        let mut errors = self.validate_login();
        errors.check(
            not_blank(&self.repeat_password),
            "repeatPassword",
            "Please, fill the repeat password field",
        );
        errors.check(
            self.passw == self.repeat_password,
            "repeatPassword",
            "Password not matched",
        );
        errors
    }

    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn input(title: &str, status: &str, due: Option<&str>) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            description: "details".to_string(),
            status: status.to_string(),
            due_at: due.map(str::to_string),
            version: None,
        }
    }

    #[test]
    fn test_first_error_wins() {
        let mut errors = FieldErrors::new();
        errors.add("title", "first");
        errors.add("title", "second");
        assert_eq!(errors.get("title"), Some("first"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_draft_requires_fields() {
        let err = TaskInput::default().into_draft(today()).unwrap_err();
        assert_eq!(err.get("title"), Some("Please, fill the title field"));
        assert_eq!(err.get("description"), Some("Please, fill the description field"));
        assert_eq!(err.get("status"), Some("Please, fill the status field"));
    }

    #[test]
    fn test_invalid_status_reported_once() {
        let err = input("A", "archived", None).into_draft(today()).unwrap_err();
        assert_eq!(err.get("status"), Some("Invalid Status Input"));
    }

    #[test]
    fn test_draft_rejects_past_or_today_due_date() {
        let err = input("A", "pending", Some("2025-06-01"))
            .into_draft(today())
            .unwrap_err();
        assert_eq!(err.get("due_at"), Some("Due date must be a future date"));

        let draft = input("A", "pending", Some("2025-06-02"))
            .into_draft(today())
            .unwrap();
        assert_eq!(draft.due_at, NaiveDate::from_ymd_opt(2025, 6, 2));
    }

    #[test]
    fn test_changes_allow_past_due_date_and_carry_version() {
        let mut raw = input("A", "in progress", Some("2000-01-01"));
        raw.version = Some(4);
        let changes = raw.into_changes().unwrap();
        assert_eq!(changes.status, TaskStatus::InProgress);
        assert_eq!(changes.expected_version, Some(4));
    }

    #[test]
    fn test_bad_date_format() {
        let err = input("A", "pending", Some("01/02/2030"))
            .into_changes()
            .unwrap_err();
        assert_eq!(
            err.get("due_at"),
            Some("Incorrect format. Expected format: YYYY-MM-DD")
        );
    }

    #[test]
    fn test_credentials() {
        let good = Credentials {
            email: "a@example.com".to_string(),
            passw: "secret1".to_string(),
            repeat_password: "secret1".to_string(),
        };
        assert!(good.validate_registration().is_empty());

        let bad = Credentials {
            email: "not-an-email".to_string(),
            passw: "no spaces allowed".to_string(),
            repeat_password: "other".to_string(),
        };
        let errors = bad.validate_registration();
        assert_eq!(errors.get("email"), Some("Invalid Email Format"));
        assert!(errors.has("password"));
        assert_eq!(errors.get("repeatPassword"), Some("Password not matched"));
    }

    #[test]
    fn test_field_errors_serialize_as_map() {
        let mut errors = FieldErrors::new();
        errors.add("title", "missing");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"title": "missing"}));
    }
}
