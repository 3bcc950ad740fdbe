//! Shared setup for the HTTP tests: an in-memory [`AppState`] behind the real
//! router, plus request helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tasklane_api::{
    auth::generate_jwt_token, create_router, ApiConfig, AppState, AuthConfig, FixedClock,
    RateLimitConfig, RateLimiter, BcryptCredentialHasher,
};
use tasklane_core::UserId;
use tasklane_storage::{InMemoryCacheStore, InMemoryUserStore, TaskCache, TaskCacheConfig};
use tasklane_test_utils::mocks::InstrumentedTaskStore;
use tower::ServiceExt;

/// Seconds since the epoch used by every test clock.
pub const NOW: i64 = 1_750_000_000;

pub const PEER: &str = "203.0.113.7:41000";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InstrumentedTaskStore>,
    pub users: Arc<InMemoryUserStore>,
    pub tasks: Arc<TaskCache>,
    pub auth: Arc<AuthConfig>,
    pub limiter: Arc<RateLimiter>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default(), RateLimitConfig::default())
    }

    pub fn with_config(config: ApiConfig, rate_limit: RateLimitConfig) -> Self {
        let store = Arc::new(InstrumentedTaskStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let tasks = Arc::new(TaskCache::new(
            store.clone(),
            Arc::new(InMemoryCacheStore::new()),
            TaskCacheConfig::default(),
        ));
        let auth = Arc::new(AuthConfig::for_testing(
            "http_test_secret_with_enough_length",
            Arc::new(FixedClock(NOW)),
        ));
        let limiter = Arc::new(RateLimiter::start(rate_limit));

        let state = AppState {
            tasks: tasks.clone(),
            users: users.clone(),
            hasher: Arc::new(BcryptCredentialHasher::new(4)),
            auth: auth.clone(),
            limiter: limiter.clone(),
            config: Arc::new(config),
            start_time: Instant::now(),
        };

        Self {
            router: create_router(state),
            store,
            users,
            tasks,
            auth,
            limiter,
        }
    }

    /// A valid bearer token for `user`.
    pub fn token(&self, user: i64) -> String {
        generate_jwt_token(&self.auth, UserId::new(user), &format!("user{user}@example.com"))
            .expect("token should sign")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

/// Build a request as if it arrived from [`PEER`].
pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    request_from(PEER, method, uri, token, body)
}

pub fn request_from(
    peer: &str,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).expect("valid request");
    let addr: SocketAddr = peer.parse().expect("valid peer address");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub fn task_body(title: &str, status: &str) -> Value {
    serde_json::json!({
        "title": title,
        "description": "details",
        "status": status,
    })
}
