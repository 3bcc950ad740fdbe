//! Admission decisions and idle-bucket reclamation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::bucket::ClientBucketStore;
use crate::config::RateLimitConfig;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// The caller could not say who the client is. Never treated as unlimited.
    #[error("Client identity could not be resolved")]
    UnresolvedIdentity,
}

/// Per-client token-bucket limiter with a background reaper.
///
/// The reaper is spawned by [`RateLimiter::start`] and stops on
/// [`RateLimiter::shutdown`] or when the limiter is dropped.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Arc<ClientBucketStore>,
    config: RateLimitConfig,
    shutdown_tx: watch::Sender<bool>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Build the limiter and spawn its reaper. Must be called inside a Tokio
    /// runtime when rate limiting is enabled.
    pub fn start(config: RateLimitConfig) -> Self {
        let buckets = Arc::new(ClientBucketStore::new(config.refill_per_sec, config.burst));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reaper = config.enabled.then(|| {
            tokio::spawn(reap_idle_buckets(
                buckets.clone(),
                config.reap_interval,
                config.idle_threshold,
                shutdown_rx,
            ))
        });

        tracing::info!(
            enabled = config.enabled,
            refill_per_sec = config.refill_per_sec,
            burst = config.burst,
            reap_interval_secs = config.reap_interval.as_secs(),
            idle_secs = config.idle_threshold.as_secs(),
            "Rate limiter started"
        );

        Self {
            buckets,
            config,
            shutdown_tx,
            reaper: Mutex::new(reaper),
        }
    }

    /// Decide whether one request from `identity` may proceed.
    pub fn allow(&self, identity: &str) -> Result<Decision, RateLimitError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(RateLimitError::UnresolvedIdentity);
        }
        if !self.config.enabled {
            return Ok(Decision::Allow);
        }
        if self.buckets.admit(identity) {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Reject)
        }
    }

    /// Whole seconds until a rejected client regains one token.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = (1.0 / self.config.refill_per_sec).ceil();
        if secs.is_finite() && secs >= 1.0 {
            secs as u64
        } else {
            1
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    pub fn buckets(&self) -> &ClientBucketStore {
        &self.buckets
    }

    /// Stop the reaper and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Rate limiter reaper ended abnormally");
            }
        }
    }

    /// Whether the reaper task is still running.
    pub fn reaper_running(&self) -> bool {
        self.reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Periodically remove buckets whose clients have gone quiet.
async fn reap_idle_buckets(
    buckets: Arc<ClientBucketStore>,
    every: Duration,
    idle: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // First scan one full period after start.
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender means the limiter is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Rate limiter reaper shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                let removed = buckets.reap_idle(Instant::now(), idle);
                if removed > 0 {
                    tracing::debug!(removed, remaining = buckets.len(), "Reaped idle rate-limit buckets");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig::default()
    }

    #[tokio::test]
    async fn test_blank_identity_fails_closed() {
        let limiter = RateLimiter::start(config());
        assert_eq!(limiter.allow(""), Err(RateLimitError::UnresolvedIdentity));
        assert_eq!(limiter.allow("   "), Err(RateLimitError::UnresolvedIdentity));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::start(RateLimitConfig {
            enabled: false,
            ..config()
        });
        for _ in 0..20 {
            assert_eq!(limiter.allow("10.0.0.1"), Ok(Decision::Allow));
        }
        assert!(!limiter.reaper_running());
        assert_eq!(limiter.allow(""), Err(RateLimitError::UnresolvedIdentity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_write_is_rejected() {
        let limiter = RateLimiter::start(config());
        let decisions: Vec<_> = (0..4).filter_map(|_| limiter.allow("10.0.0.1").ok()).collect();
        assert_eq!(
            decisions,
            vec![Decision::Allow, Decision::Allow, Decision::Allow, Decision::Reject]
        );
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_idle_clients() {
        let limiter = RateLimiter::start(config());
        let _ = limiter.allow("10.0.0.1");
        let _ = limiter.allow("10.0.0.2");
        assert_eq!(limiter.tracked_clients(), 2);

        // Keep .2 active; .1 goes quiet.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = limiter.allow("10.0.0.2");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!limiter.buckets().contains("10.0.0.1"));
        assert!(limiter.buckets().contains("10.0.0.2"));
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_keeps_recent_clients() {
        let limiter = RateLimiter::start(config());
        let _ = limiter.allow("10.0.0.1");
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(limiter.buckets().contains("10.0.0.1"));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_reaper() {
        let limiter = RateLimiter::start(config());
        assert!(limiter.reaper_running());
        limiter.shutdown().await;
        assert!(!limiter.reaper_running());
    }

    #[tokio::test]
    async fn test_drop_signals_reaper() {
        let limiter = RateLimiter::start(config());
        let mut rx = limiter.shutdown_tx.subscribe();
        drop(limiter);
        // Sender is gone, so the channel reports closure or the final value.
        assert!(rx.changed().await.is_err() || *rx.borrow());
    }

    #[tokio::test]
    async fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::start(RateLimitConfig {
            refill_per_sec: 0.5,
            ..config()
        });
        assert_eq!(limiter.retry_after_secs(), 2);
        limiter.shutdown().await;
    }
}
