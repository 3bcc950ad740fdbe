//! Middleware modules for the Tasklane API
//!
//! - `auth`: bearer-token authentication and the `CurrentUser` extractor
//! - `rate_limit`: per-client admission for write endpoints
//! - `guards`: request deadline, maintenance switch, secure headers
//!
//! # Middleware Order
//!
//! Write routes layer rate limiting outside authentication, so a flood of
//! unauthenticated writes is still throttled:
//!
//! ```ignore
//! Router::new()
//!     .route("/tasks", post(create_task))
//!     // Innermost
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     // Outermost
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//! ```

mod auth;
mod guards;
mod rate_limit;

pub use auth::{auth_middleware, AuthMiddlewareState, CurrentUser};
pub use guards::{
    maintenance_middleware, secure_header_layers, timeout_middleware, SECURE_HEADERS,
};
pub use rate_limit::{client_identity, rate_limit_middleware, RateLimitState};
