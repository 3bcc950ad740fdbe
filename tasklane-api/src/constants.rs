//! Constants for the Tasklane API
//!
//! Defaults for every tunable that `from_env()` constructors fall back to.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Default JWT token expiration time in seconds (4 hours)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 4 * 3600;

/// Clock skew tolerated when checking `exp`
pub const DEFAULT_JWT_LEEWAY_SECS: i64 = 30;

/// Minimum required length for JWT secret keys in production
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Development-only signing secret
pub const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// bcrypt work factor for new password hashes
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Bounds bcrypt accepts for its cost parameter
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Bytes of randomness in an activation token
pub const ACTIVATION_TOKEN_BYTES: usize = 16;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Tokens added per second to each client bucket
pub const DEFAULT_RATE_LIMIT_REFILL_PER_SEC: f64 = 5.0;

/// Bucket capacity
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 3;

/// How often the reaper scans for idle clients
pub const DEFAULT_RATE_LIMIT_REAP_INTERVAL_SECS: u64 = 60;

/// Clients unseen for longer than this are forgotten
pub const DEFAULT_RATE_LIMIT_IDLE_SECS: u64 = 180;

// ============================================================================
// REQUESTS
// ============================================================================

/// Per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Largest accepted request body
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Header that lets an operator through maintenance mode
pub const USER_ROLE_HEADER: &str = "x-user-role";

// ============================================================================
// CACHE
// ============================================================================

/// Lifetime of a populated cache entry
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

// ============================================================================
// SERVER
// ============================================================================

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_defaults_match_production_values() {
        assert_eq!(DEFAULT_RATE_LIMIT_REFILL_PER_SEC, 5.0);
        assert_eq!(DEFAULT_RATE_LIMIT_BURST, 3);
        assert!(DEFAULT_RATE_LIMIT_IDLE_SECS > DEFAULT_RATE_LIMIT_REAP_INTERVAL_SECS);
    }

    #[test]
    fn test_insecure_default_is_long_enough_to_be_flagged_by_name_only() {
        assert!(INSECURE_DEFAULT_SECRET.len() >= MIN_JWT_SECRET_LENGTH);
    }
}
