//! Rate limiting middleware for write endpoints.

use crate::error::ApiError;
use crate::ratelimit::{Decision, RateLimiter};
use crate::telemetry::with_metrics;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Shared state for rate limiting middleware.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

/// Resolve the client identity for a request.
///
/// Proxy headers are only honoured when `trust_forwarded` is set; otherwise
/// the peer address is the identity. An empty string means nothing
/// resolved, which the limiter rejects.
pub fn client_identity(request: &Request, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        let real_ip = || {
            request
                .headers()
                .get(X_REAL_IP)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        };
        if let Some(ip) = forwarded.or_else(real_ip) {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Admit or reject one write request.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limiter = &state.limiter;
    let identity = client_identity(&request, limiter.config().trust_forwarded_headers);

    let decision = limiter.allow(&identity).map_err(|e| {
        with_metrics(|m| m.record_rate_limit("unresolved", limiter.tracked_clients()));
        e
    })?;

    match decision {
        Decision::Allow => {
            with_metrics(|m| m.record_rate_limit("allow", limiter.tracked_clients()));
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&limiter.config().burst.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-ratelimit-limit"), value);
            }
            Ok(response)
        }
        Decision::Reject => {
            with_metrics(|m| m.record_rate_limit("reject", limiter.tracked_clients()));
            tracing::info!(client = %identity, "Rate limit exceeded");
            Err(ApiError::too_many_requests(Some(limiter.retry_after_secs())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_from(peer: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = HttpRequest::builder().uri("/tasks");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).expect("valid request");
        if let Ok(addr) = peer.parse::<SocketAddr>() {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_peer_address_is_identity() {
        let request = request_from("10.0.0.1:5000", &[(X_FORWARDED_FOR, "1.2.3.4")]);
        assert_eq!(client_identity(&request, false), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_header_when_trusted() {
        let request = request_from(
            "10.0.0.1:5000",
            &[(X_FORWARDED_FOR, "203.0.113.7, 10.0.0.9")],
        );
        assert_eq!(client_identity(&request, true), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback_when_forwarded_is_garbage() {
        let request = request_from(
            "10.0.0.1:5000",
            &[(X_FORWARDED_FOR, "not-an-ip"), (X_REAL_IP, "198.51.100.2")],
        );
        assert_eq!(client_identity(&request, true), "198.51.100.2");
    }

    #[test]
    fn test_no_peer_resolves_to_empty() {
        let request = request_from("", &[]);
        assert_eq!(client_identity(&request, true), "");
    }
}
