//! Per-client token buckets.
//!
//! One [`ClientBucket`] per client identity, held in a sharded map. Every
//! admission runs under the shard lock for its identity, so concurrent
//! requests from the same client never both take the last token.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Token-bucket state for one client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientBucket {
    /// Available tokens, always within `[0, capacity]`.
    pub tokens: f64,
    pub last_refill: Instant,
    pub last_seen: Instant,
}

impl ClientBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant, refill_per_sec: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).clamp(0.0, capacity);
        // A clock that did not move forward leaves last_refill alone.
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// Holds one [`ClientBucket`] per identity.
#[derive(Debug)]
pub struct ClientBucketStore {
    buckets: DashMap<String, ClientBucket>,
    refill_per_sec: f64,
    capacity: f64,
}

impl ClientBucketStore {
    /// Buckets refill at `refill_per_sec` tokens per second up to `burst`.
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            refill_per_sec,
            capacity: f64::from(burst),
        }
    }

    /// Admit one request from `identity` now.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Admit one request from `identity` at `now`.
    ///
    /// New identities start with a full bucket. `last_seen` moves on every
    /// call, admitted or not.
    pub fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut bucket = self
            .buckets
            .entry(identity.to_owned())
            .or_insert_with(|| ClientBucket::full(self.capacity, now));

        bucket.refill(now, self.refill_per_sec, self.capacity);
        if now > bucket.last_seen {
            bucket.last_seen = now;
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove buckets unseen for longer than `idle`. Returns how many went.
    ///
    /// Locks one shard at a time, so admissions to other shards proceed
    /// while the scan runs.
    pub fn reap_idle(&self, now: Instant, idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= idle);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.buckets.contains_key(identity)
    }

    /// Copy of one client's state.
    pub fn snapshot(&self, identity: &str) -> Option<ClientBucket> {
        self.buckets.get(identity).map(|b| *b)
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }
}
