//! Background Jobs for the Tasklane API
//!
//! - `notifications`: logs task change events published on the cache
//!   service's pub/sub channel
//!
//! The rate limiter's idle-client reaper lives with the limiter itself.
//!
//! # Usage
//!
//! ```ignore
//! use tasklane_api::jobs::notification_listener;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(notification_listener(cache, channel, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod notifications;

pub use notifications::{notification_listener, NotificationMetrics};
