//! Prometheus Metrics Definitions
//!
//! Defines all Tasklane metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TasklaneMetrics>> = Lazy::new(TasklaneMetrics::new);

/// Container for all Tasklane metrics.
#[derive(Clone)]
pub struct TasklaneMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Rate limiter decisions - labels: decision (allow/reject/unresolved)
    pub rate_limit_decisions_total: CounterVec,

    /// Client identities currently holding a token bucket
    pub rate_limit_tracked_clients: Gauge,

    /// Task cache lookups - labels: outcome (hit/miss/unavailable)
    pub cache_lookups_total: CounterVec,

    /// Cache invalidations that failed after a committed write
    pub cache_invalidation_failures: Gauge,
}

impl TasklaneMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "tasklane_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "tasklane_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            rate_limit_decisions_total: register_counter_vec!(
                "tasklane_rate_limit_decisions_total",
                "Rate limiter admission decisions",
                &["decision"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_decisions_total: {}", e)))?,

            rate_limit_tracked_clients: register_gauge!(
                "tasklane_rate_limit_tracked_clients",
                "Client identities currently tracked by the rate limiter"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_tracked_clients: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "tasklane_cache_lookups_total",
                "Task cache lookups by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            cache_invalidation_failures: register_gauge!(
                "tasklane_cache_invalidation_failures",
                "Cache invalidations that failed after a committed write"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_invalidation_failures: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record one admission decision and the current tracked-client count.
    pub fn record_rate_limit(&self, decision: &str, tracked_clients: usize) {
        self.rate_limit_decisions_total
            .with_label_values(&[decision])
            .inc();
        self.rate_limit_tracked_clients.set(tracked_clients as f64);
    }

    /// Publish the task cache counters.
    ///
    /// The cache keeps its own monotonic counters; this copies the deltas
    /// since the last scrape into the Prometheus counters.
    pub fn sync_cache_stats(&self, stats: &tasklane_storage::CacheStatsSnapshot) {
        for (outcome, total) in [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("unavailable", stats.unavailable),
        ] {
            let counter = self.cache_lookups_total.with_label_values(&[outcome]);
            let seen = counter.get();
            let total = total as f64;
            if total > seen {
                counter.inc_by(total - seen);
            }
        }
        self.cache_invalidation_failures
            .set(stats.invalidation_failures as f64);
    }
}

/// Record through the global registry, logging once if it failed to build.
pub fn with_metrics(f: impl FnOnce(&TasklaneMetrics)) {
    match METRICS.as_ref() {
        Ok(metrics) => f(metrics),
        Err(e) => tracing::debug!(error = %e.message, "Metrics unavailable"),
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use tasklane_storage::CacheStatsSnapshot;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_http_request("GET", "/tasks/{id}", 200, 0.015);
        Ok(())
    }

    #[test]
    fn test_record_rate_limit_sets_gauge() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_rate_limit("reject", 7);
        assert_eq!(metrics.rate_limit_tracked_clients.get(), 7.0);
        Ok(())
    }

    #[test]
    fn test_sync_cache_stats_never_decreases() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        let snapshot = CacheStatsSnapshot {
            hits: 5,
            misses: 2,
            unavailable: 0,
            invalidation_failures: 1,
        };
        metrics.sync_cache_stats(&snapshot);
        let hits = metrics.cache_lookups_total.with_label_values(&["hit"]).get();
        metrics.sync_cache_stats(&snapshot);
        assert_eq!(metrics.cache_lookups_total.with_label_values(&["hit"]).get(), hits);
        assert!(hits >= 5.0);
        Ok(())
    }
}
