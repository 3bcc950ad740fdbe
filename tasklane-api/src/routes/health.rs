//! Health Check and Metrics Endpoints
//!
//! No authentication required.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tasklane_storage::TaskCache;

use crate::telemetry::{metrics_handler, with_metrics};

/// Health check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// GET /health - Process liveness.
pub async fn health(State(start_time): State<Instant>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
    })
}

/// GET /metrics - Prometheus text, with the cache counters refreshed first.
pub async fn metrics(State(tasks): State<Arc<TaskCache>>) -> impl IntoResponse {
    let stats = tasks.stats();
    with_metrics(|m| m.sync_cache_stats(&stats));
    metrics_handler().await
}
