//! Axum Middleware for HTTP Request Metrics
//!
//! Records a Prometheus counter and latency observation for every request
//! and logs its completion. Request spans come from tower-http's
//! `TraceLayer`, applied in the router.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use super::metrics::with_metrics;

/// Normalize path for metrics labels (replace ids and tokens with placeholders).
///
/// This prevents high-cardinality label explosion in Prometheus.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
            let token = segment.len() >= 16 && segment.bytes().all(|b| b.is_ascii_hexdigit());
            if numeric || token {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    with_metrics(|m| {
        m.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        )
    });

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
