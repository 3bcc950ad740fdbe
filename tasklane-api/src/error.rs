//! Error Types for the Tasklane API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Errors go over the wire as `{"status": false, "error": <message>, "code": <CODE>}`,
//! plus `details` when there is something structured to report.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tasklane_core::{ConfigError, StoreError, TaskError, UserError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Credentials were wrong or the account cannot log in
    InvalidCredentials,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested task does not exist or is not accessible to the caller
    TaskNotFound,

    /// Activation token does not match any account
    TokenNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Optimistic version check failed
    ConcurrentModification,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Service is in maintenance mode
    Maintenance,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,

    /// Request deadline elapsed
    Timeout,

    /// Request rate limit exceeded
    TooManyRequests,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidCredentials => StatusCode::BAD_REQUEST,

            ErrorCode::TaskNotFound | ErrorCode::TokenNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ConcurrentModification => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable
            | ErrorCode::Maintenance
            | ErrorCode::ConnectionPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Incorrect Input data provided",
            ErrorCode::InvalidCredentials => "Invalid credentials",
            ErrorCode::TaskNotFound => "Task not found",
            ErrorCode::TokenNotFound => "No matching record found",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Maintenance => {
                "The server is currently under maintenance. Please try again later."
            }
            ErrorCode::ConnectionPoolExhausted => "Service temporarily unavailable",
            ErrorCode::Timeout => "request timeout",
            ErrorCode::TooManyRequests => "rate limit exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds until a rate-limited client may retry
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Field-level validation failure; `details` maps field to message.
    pub fn validation_failed(fields: &tasklane_core::FieldErrors) -> Self {
        let details = serde_json::to_value(fields).unwrap_or(serde_json::Value::Null);
        Self::from_code(ErrorCode::ValidationFailed).with_details(details)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// The single not-found response for tasks, whatever the underlying reason.
    pub fn task_not_found() -> Self {
        Self::from_code(ErrorCode::TaskNotFound)
    }

    pub fn concurrent_modification(id: impl fmt::Display, expected: u32) -> Self {
        Self::new(
            ErrorCode::ConcurrentModification,
            format!("Task {} was modified by another request (expected version {})", id, expected),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn maintenance() -> Self {
        Self::from_code(ErrorCode::Maintenance)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    /// Request deadline elapsed.
    pub fn timeout() -> Self {
        Self::from_code(ErrorCode::Timeout)
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let mut err = Self::from_code(ErrorCode::TooManyRequests);
        err.retry_after_secs = retry_after_secs;
        err
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: bool,
    error: &'a str,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: false,
            error: &self.message,
            code: self.code,
            details: self.details.as_ref(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        // Log the full error; the caller only learns that something failed.
        tracing::error!(error = %err, "Store error");
        match err {
            StoreError::Duplicate { field } => {
                let mut fields = tasklane_core::FieldErrors::new();
                fields.add(&field, "Email already registered");
                ApiError::validation_failed(&fields)
            }
            StoreError::Unavailable { .. } | StoreError::Corrupt { .. } => {
                ApiError::database_error("Internal server error")
            }
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound { .. } | TaskError::NotOwnedOrMissing { .. } => {
                ApiError::task_not_found()
            }
            TaskError::VersionConflict { id, expected } => {
                ApiError::concurrent_modification(id, expected)
            }
            TaskError::Validation(fields) => ApiError::validation_failed(&fields),
            TaskError::Store(store) => ApiError::from(store),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::InvalidCredentials => ApiError::from_code(ErrorCode::InvalidCredentials),
            UserError::AccountInactive => {
                ApiError::new(ErrorCode::InvalidCredentials, "Account is inactive")
            }
            UserError::UnknownActivationToken => ApiError::from_code(ErrorCode::TokenNotFound),
            UserError::Validation(fields) => ApiError::validation_failed(&fields),
            UserError::Hashing { reason } | UserError::Signing { reason } => {
                tracing::error!(reason = %reason, "Credential processing failed");
                ApiError::internal_error("Internal server error")
            }
            UserError::Store(store) => ApiError::from(store),
        }
    }
}

impl From<crate::ratelimit::RateLimitError> for ApiError {
    fn from(err: crate::ratelimit::RateLimitError) -> Self {
        // Fail closed: an unknown client is a server fault, not a free pass.
        tracing::error!(error = %err, "Rate limiter could not identify client");
        ApiError::internal_error("Internal server error")
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {err}"))
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::database_error("Internal server error")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Internal server error"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!("JSON decoding error: {:?}", err);
        ApiError::from_code(ErrorCode::InvalidInput)
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
