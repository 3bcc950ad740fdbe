//! Request-wide guards: deadline, maintenance switch and secure headers.

use crate::constants::USER_ROLE_HEADER;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::set_header::SetResponseHeaderLayer;

// ============================================================================
// DEADLINE
// ============================================================================

/// Fail the request with 504 once `deadline` elapses.
///
/// The inner future is dropped at the deadline, which aborts any store or
/// cache call still in flight.
pub async fn timeout_middleware(
    State(deadline): State<Duration>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    tokio::time::timeout(deadline, next.run(request))
        .await
        .map_err(|_| {
            tracing::warn!(
                method = %method,
                path = %path,
                deadline_ms = deadline.as_millis() as u64,
                "Request deadline exceeded"
            );
            ApiError::timeout()
        })
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Answer 503 to everyone but admins while maintenance mode is on.
pub async fn maintenance_middleware(
    State(enabled): State<bool>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if enabled {
        let is_admin = request
            .headers()
            .get(USER_ROLE_HEADER)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|role| role == "admin");
        if !is_admin {
            return Err(ApiError::maintenance());
        }
    }
    Ok(next.run(request).await)
}

// ============================================================================
// SECURE HEADERS
// ============================================================================

/// Headers set on every response from the write routes.
pub const SECURE_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
    ),
    ("referrer-policy", "origin-when-cross-origin"),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "deny"),
    ("x-xss-protection", "0"),
];

/// One overriding layer per entry in [`SECURE_HEADERS`].
pub fn secure_header_layers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    SECURE_HEADERS
        .iter()
        .map(|&(name, value)| {
            SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn maintenance_app(enabled: bool) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(enabled, maintenance_middleware))
    }

    #[tokio::test]
    async fn test_maintenance_blocks_non_admin() -> Result<(), String> {
        let request = HttpRequest::builder()
            .uri("/")
            .header(USER_ROLE_HEADER, "user")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = maintenance_app(true)
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn test_maintenance_admits_admin() -> Result<(), String> {
        let request = HttpRequest::builder()
            .uri("/")
            .header(USER_ROLE_HEADER, "admin")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = maintenance_app(true)
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_maintenance_off_admits_everyone() -> Result<(), String> {
        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = maintenance_app(false)
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() -> Result<(), String> {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    "late"
                }),
            )
            .layer(from_fn_with_state(Duration::from_secs(5), timeout_middleware));
        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        Ok(())
    }

    #[test]
    fn test_secure_header_names_are_lowercase() {
        // HeaderName::from_static panics on uppercase input.
        for (name, _) in SECURE_HEADERS {
            assert_eq!(*name, name.to_ascii_lowercase());
        }
        assert_eq!(secure_header_layers().len(), SECURE_HEADERS.len());
    }
}
