//! API Request and Response Types
//!
//! Task bodies reuse `tasklane_core::TaskInput` and `TaskView`; this module
//! holds the envelopes around them.

use serde::{Deserialize, Serialize};

/// Success envelope for write endpoints: `{"status":true,"message":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub status: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
        }
    }
}

/// Successful login. The token is also returned in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub status: bool,
    pub message: String,
    pub token: String,
}

/// Successful update, carrying the row's new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub status: bool,
    pub message: String,
    pub version: u32,
}

/// Created task, with the success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub status: bool,
    pub message: String,
    pub task: tasklane_core::TaskView,
}
