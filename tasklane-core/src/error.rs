//! Error types for Tasklane operations

use crate::validation::FieldErrors;
use crate::TaskId;
use thiserror::Error;

/// Backing-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    #[error("Duplicate value for {field}")]
    Duplicate { field: String },

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

impl StoreError {
    pub fn unavailable(operation: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Unavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Cache errors. These never fail a request; callers fall back to the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    #[error("Cache payload for {key} could not be decoded: {reason}")]
    Serialization { key: String, reason: String },
}

impl CacheError {
    pub fn unavailable(operation: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::Unavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Task read and write errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {id}")]
    NotFound { id: TaskId },

    /// Missing, deleted, or owned by someone else. Deliberately indistinguishable.
    #[error("Task not found or not accessible: {id}")]
    NotOwnedOrMissing { id: TaskId },

    #[error("Task {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: TaskId, expected: u32 },

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<FieldErrors> for TaskError {
    fn from(errors: FieldErrors) -> Self {
        TaskError::Validation(errors)
    }
}

/// Account and credential errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("No matching activation token")]
    UnknownActivationToken,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Credential hashing failed: {reason}")]
    Hashing { reason: String },

    #[error("Token signing failed: {reason}")]
    Signing { reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Result type alias for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
