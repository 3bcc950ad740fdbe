//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, request deadlines, maintenance mode
//! and backend selection. Every struct is loaded from `TASKLANE_*` environment
//! variables with development-friendly defaults.

use std::str::FromStr;
use std::time::Duration;

use tasklane_core::ConfigError;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_BODY_LIMIT_BYTES, DEFAULT_CACHE_TTL_SECS, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_IDLE_SECS, DEFAULT_RATE_LIMIT_REAP_INTERVAL_SECS,
    DEFAULT_RATE_LIMIT_REFILL_PER_SEC, DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Read a variable through `lookup` and parse it, falling back to `default`
/// when it is unset or unparsable.
fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server-wide HTTP settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Deadline for every request.
    pub request_timeout: Duration,

    /// Largest accepted request body.
    pub body_limit_bytes: usize,

    /// When set, only `X-User-Role: admin` requests are served.
    pub maintenance: bool,

    pub bind_host: String,
    pub port: u16,

    /// production, staging, development
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            maintenance: false,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TASKLANE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TASKLANE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `TASKLANE_REQUEST_TIMEOUT_SECS`: Per-request deadline (default: 5)
    /// - `TASKLANE_BODY_LIMIT_BYTES`: Max request body (default: 65536)
    /// - `TASKLANE_SERVER_STATUS`: "maintenance" enables maintenance mode
    /// - `TASKLANE_API_BIND`, `PORT` / `TASKLANE_API_PORT`: listen address
    /// - `TASKLANE_ENVIRONMENT`: deployment environment (default: development)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();

        let cors_origins = lookup("TASKLANE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let maintenance = lookup("TASKLANE_SERVER_STATUS")
            .map(|s| s.trim().eq_ignore_ascii_case("maintenance"))
            .unwrap_or(false);

        let port = lookup("PORT")
            .or_else(|| lookup("TASKLANE_API_PORT"))
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.port);

        Self {
            cors_origins,
            cors_max_age_secs: parsed(&lookup, "TASKLANE_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),
            request_timeout: Duration::from_secs(parsed(
                &lookup,
                "TASKLANE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            body_limit_bytes: parsed(&lookup, "TASKLANE_BODY_LIMIT_BYTES", defaults.body_limit_bytes),
            maintenance,
            bind_host: lookup("TASKLANE_API_BIND").unwrap_or(defaults.bind_host),
            port,
            environment: lookup("TASKLANE_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_maintenance(mut self, maintenance: bool) -> Self {
        self.maintenance = maintenance;
        self
    }
}

// ============================================================================
// RATE LIMIT CONFIGURATION
// ============================================================================

/// Token-bucket parameters for write endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    pub enabled: bool,

    /// Tokens added per second (R).
    pub refill_per_sec: f64,

    /// Bucket capacity (C).
    pub burst: u32,

    /// How often the reaper runs.
    pub reap_interval: Duration,

    /// Buckets unseen for longer than this are removed.
    pub idle_threshold: Duration,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only safe behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refill_per_sec: DEFAULT_RATE_LIMIT_REFILL_PER_SEC,
            burst: DEFAULT_RATE_LIMIT_BURST,
            reap_interval: Duration::from_secs(DEFAULT_RATE_LIMIT_REAP_INTERVAL_SECS),
            idle_threshold: Duration::from_secs(DEFAULT_RATE_LIMIT_IDLE_SECS),
            trust_forwarded_headers: false,
        }
    }
}

impl RateLimitConfig {
    /// Environment variables:
    /// - `TASKLANE_RATE_LIMIT_ENABLED` (default: true)
    /// - `TASKLANE_RATE_LIMIT_REFILL_PER_SEC` (default: 5)
    /// - `TASKLANE_RATE_LIMIT_BURST` (default: 3)
    /// - `TASKLANE_RATE_LIMIT_REAP_INTERVAL_SECS` (default: 60)
    /// - `TASKLANE_RATE_LIMIT_IDLE_SECS` (default: 180)
    /// - `TASKLANE_TRUST_FORWARDED_HEADERS` (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let enabled = lookup("TASKLANE_RATE_LIMIT_ENABLED")
            .map(|s| s.trim().to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            enabled,
            refill_per_sec: parsed(
                &lookup,
                "TASKLANE_RATE_LIMIT_REFILL_PER_SEC",
                DEFAULT_RATE_LIMIT_REFILL_PER_SEC,
            ),
            burst: parsed(&lookup, "TASKLANE_RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
            reap_interval: Duration::from_secs(parsed(
                &lookup,
                "TASKLANE_RATE_LIMIT_REAP_INTERVAL_SECS",
                DEFAULT_RATE_LIMIT_REAP_INTERVAL_SECS,
            )),
            idle_threshold: Duration::from_secs(parsed(
                &lookup,
                "TASKLANE_RATE_LIMIT_IDLE_SECS",
                DEFAULT_RATE_LIMIT_IDLE_SECS,
            )),
            trust_forwarded_headers: flag(&lookup, "TASKLANE_TRUST_FORWARDED_HEADERS", false),
        }
    }

    /// Reject parameters the bucket arithmetic cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.refill_per_sec.is_finite() && self.refill_per_sec > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_refill_per_sec".to_string(),
                value: self.refill_per_sec.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_burst".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_reap_interval".to_string(),
                value: "0".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// Where task and user rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "TASKLANE_STORE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected postgres or memory".to_string(),
            }),
        }
    }
}

/// Which cache service fronts the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "TASKLANE_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected redis or memory".to_string(),
            }),
        }
    }
}

/// Cache service settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            entry_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl CacheConfig {
    /// Environment variables:
    /// - `TASKLANE_CACHE_BACKEND`: redis or memory (default: redis)
    /// - `TASKLANE_REDIS_URL` (default: redis://127.0.0.1:6379)
    /// - `TASKLANE_CACHE_TTL_SECS` (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend = match lookup("TASKLANE_CACHE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };
        Ok(Self {
            backend,
            redis_url: lookup("TASKLANE_REDIS_URL").unwrap_or(defaults.redis_url),
            entry_ttl: Duration::from_secs(parsed(
                &lookup,
                "TASKLANE_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
        })
    }
}

/// `TASKLANE_STORE_BACKEND`: postgres or memory (default: postgres)
pub fn store_backend_from_env() -> Result<StoreBackend, ConfigError> {
    match env_lookup("TASKLANE_STORE_BACKEND") {
        Some(raw) => raw.parse(),
        None => Ok(StoreBackend::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::from_lookup(vars(&[]));
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.maintenance);
        assert!(!config.is_production());
    }

    #[test]
    fn test_api_config_reads_maintenance_and_origins() {
        let config = ApiConfig::from_lookup(vars(&[
            ("TASKLANE_SERVER_STATUS", "Maintenance"),
            ("TASKLANE_CORS_ORIGINS", "https://a.example, ,https://b.example"),
            ("PORT", "9000"),
        ]));
        assert!(config.maintenance);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_rate_limit_config_defaults() {
        let config = RateLimitConfig::from_lookup(vars(&[]));
        assert_eq!(config, RateLimitConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_config_rejects_zero_burst() {
        let config = RateLimitConfig::from_lookup(vars(&[("TASKLANE_RATE_LIMIT_BURST", "0")]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config =
            RateLimitConfig::from_lookup(vars(&[("TASKLANE_RATE_LIMIT_REFILL_PER_SEC", "fast")]));
        assert_eq!(config.refill_per_sec, DEFAULT_RATE_LIMIT_REFILL_PER_SEC);
    }

    #[test]
    fn test_cache_backend_parsing() -> Result<(), String> {
        let config = CacheConfig::from_lookup(vars(&[("TASKLANE_CACHE_BACKEND", "memory")]))
            .map_err(|e| e.to_string())?;
        assert_eq!(config.backend, CacheBackend::Memory);
        assert!(CacheConfig::from_lookup(vars(&[("TASKLANE_CACHE_BACKEND", "lmdb")])).is_err());
        Ok(())
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().ok(), Some(StoreBackend::Memory));
        assert_eq!("PG".parse::<StoreBackend>().ok(), Some(StoreBackend::Postgres));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }
}
