//! REST API Routes Module
//!
//! - `tasks`: task listing, lookup and the rate-limited write endpoints
//! - `users`: registration, login and account activation
//! - `health`: liveness and Prometheus metrics
//!
//! [`create_router`] assembles everything with the middleware stack.

pub mod health;
pub mod tasks;
pub mod users;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::constants::USER_ROLE_HEADER;
use crate::middleware::{
    auth_middleware, maintenance_middleware, rate_limit_middleware, secure_header_layers,
    timeout_middleware, AuthMiddlewareState, RateLimitState,
};
use crate::state::AppState;
use crate::telemetry::observability_middleware;

// ============================================================================
// ROUTER
// ============================================================================

/// Routes that mutate tasks.
///
/// # Middleware Order (outer to inner)
/// 1. Secure headers - set on every response, rejections included
/// 2. Rate limiting - rejects floods before token validation
/// 3. Auth - validates the bearer token
fn write_routes(state: &AppState) -> Router<AppState> {
    let auth_state = AuthMiddlewareState::new(state.auth.clone());
    let rate_limit_state = RateLimitState::new(state.limiter.clone());

    let router = Router::new()
        .route("/tasks", post(tasks::create_task))
        .route("/tasks/update/:id", put(tasks::update_task))
        .route("/tasks/delete/:id", delete(tasks::delete_task))
        .route_layer(from_fn_with_state(auth_state, auth_middleware))
        .route_layer(from_fn_with_state(rate_limit_state, rate_limit_middleware));

    secure_header_layers()
        .into_iter()
        .fold(router, |router, layer| router.route_layer(layer))
}

/// Routes open to anonymous callers.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/:id", get(tasks::get_task))
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/activation_token/:token", get(users::activate))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
}

/// Build the complete application router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - handles preflight requests
/// 2. Trace - one span per request
/// 3. Observability - request metrics, including timed-out requests
/// 4. Maintenance - 503 for everyone but admins
/// 5. Deadline - 504 when the handler overruns
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    public_routes()
        .merge(write_routes(&state))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(from_fn_with_state(config.request_timeout, timeout_middleware))
        .layer(from_fn_with_state(config.maintenance, maintenance_middleware))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        cors.allow_origin(origins)
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(USER_ROLE_HEADER),
            ])
            .expose_headers([
                header::AUTHORIZATION,
                header::RETRY_AFTER,
                HeaderName::from_static("x-ratelimit-limit"),
            ])
    }
}
