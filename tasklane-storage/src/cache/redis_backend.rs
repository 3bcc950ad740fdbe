//! Redis cache backend.
//!
//! Commands go through a `deadpool-redis` pool. Pub/sub needs a dedicated
//! connection per subscription, so the backend also keeps a plain client.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use futures_util::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;
use tasklane_core::{CacheError, CacheResult};

use super::traits::CacheStore;

/// Keys fetched per `SCAN` round during prefix deletion.
const SCAN_BATCH: usize = 200;

pub struct RedisCacheStore {
    pool: Pool,
    client: redis::Client,
}

impl RedisCacheStore {
    /// Creates a backend from a Redis URL. Connections are opened lazily.
    pub fn from_url(redis_url: &str) -> CacheResult<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::unavailable("create_pool", e))?;
        let client =
            redis::Client::open(redis_url).map_err(|e| CacheError::unavailable("open_client", e))?;
        Ok(Self { pool, client })
    }

    async fn connection(&self, operation: &str) -> CacheResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::unavailable(operation, e))
    }

    /// Round-trip a `PING`, for readiness checks.
    pub async fn ping(&self) -> CacheResult<()> {
        let mut connection = self.connection("ping").await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *connection)
            .await
            .map(|_| ())
            .map_err(|e| CacheError::unavailable("ping", e))
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut connection = self.connection("get").await?;
        connection
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| CacheError::unavailable("get", e))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut connection = self.connection("set").await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut *connection)
            .await
            .map_err(|e| CacheError::unavailable("set", e))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut connection = self.connection("delete").await?;
        connection
            .del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::unavailable("delete", e))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut connection = self.connection("delete_by_prefix").await?;
        let pattern = glob_prefix(prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *connection)
                .await
                .map_err(|e| CacheError::unavailable("scan", e))?;
            if !keys.is_empty() {
                removed += connection
                    .del::<_, u64>(keys)
                    .await
                    .map_err(|e| CacheError::unavailable("delete_by_prefix", e))?;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()> {
        let mut connection = self.connection("publish").await?;
        connection
            .publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| CacheError::unavailable("publish", e))
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<BoxStream<'static, Vec<u8>>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::unavailable("subscribe", e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| CacheError::unavailable("subscribe", e))?;
        Ok(pubsub
            .into_on_message()
            .map(|message| message.get_payload_bytes().to_vec())
            .boxed())
    }
}
