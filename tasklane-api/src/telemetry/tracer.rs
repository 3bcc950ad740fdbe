//! Tracing Subscriber Initialization
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` driven by
//! `RUST_LOG` plus a JSON or human-readable formatter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str =
    "tasklane_api=debug,tasklane_storage=debug,tower_http=info,info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (production).
    Json,
    /// Multi-line, colored output (local development).
    Pretty,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// `TASKLANE_LOG_FORMAT`: `json` (default) or `pretty`
    pub log_format: LogFormat,
    /// Enable the /metrics endpoint
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        Self {
            service_name: lookup("TASKLANE_SERVICE_NAME")
                .unwrap_or_else(|| "tasklane-api".to_string()),
            service_version: lookup("TASKLANE_SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            environment: lookup("TASKLANE_ENVIRONMENT")
                .unwrap_or_else(|| "development".to_string()),
            log_format: lookup("TASKLANE_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(LogFormat::Json),
            metrics_enabled: lookup("TASKLANE_METRICS_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(true),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Call once at startup before any tracing occurs. A second call fails
/// because the global subscriber is already set.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = %config.environment,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );

    Ok(())
}
