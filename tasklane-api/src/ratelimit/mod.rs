//! Per-client rate limiting for write endpoints.
//!
//! - `bucket`: token-bucket state per client identity
//! - `limiter`: admission decisions plus the idle-bucket reaper

pub mod bucket;
pub mod limiter;

pub use bucket::{ClientBucket, ClientBucketStore};
pub use limiter::{Decision, RateLimitError, RateLimiter};
