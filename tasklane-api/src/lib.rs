//! Tasklane API - HTTP Layer
//!
//! Axum routes for tasks and accounts, the per-client rate limiter guarding
//! the write endpoints, bearer-token auth, the Postgres implementation of the
//! storage traits, and the ambient pieces around them (config, tracing,
//! Prometheus metrics, background jobs).

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use auth::{
    generate_jwt_token, validate_jwt_token, AuthConfig, AuthUser, Claims, CredentialHasher,
    FixedClock, JwtClock, BcryptCredentialHasher, SystemClock,
};
pub use config::{ApiConfig, CacheBackend, CacheConfig, RateLimitConfig, StoreBackend};
pub use db::{run_migrations, DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use ratelimit::{Decision, RateLimitError, RateLimiter};
pub use routes::create_router;
pub use state::AppState;
pub use types::*;
