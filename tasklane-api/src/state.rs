//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tasklane_storage::{TaskCache, UserStore};

use crate::auth::{AuthConfig, CredentialHasher};
use crate::config::ApiConfig;
use crate::ratelimit::RateLimiter;

/// Application-wide state shared across all routes.
///
/// Everything is behind an `Arc`, so cloning per request is cheap. The
/// limiter is created once in `main` and owned here; nothing about it is
/// global.
#[derive(Clone)]
pub struct AppState {
    /// Read-through cache in front of the task store.
    pub tasks: Arc<TaskCache>,
    pub users: Arc<dyn UserStore>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub auth: Arc<AuthConfig>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<TaskCache>, tasks);
crate::impl_from_ref!(Arc<dyn UserStore>, users);
crate::impl_from_ref!(Arc<dyn CredentialHasher>, hasher);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(Arc<RateLimiter>, limiter);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Instant, start_time);
