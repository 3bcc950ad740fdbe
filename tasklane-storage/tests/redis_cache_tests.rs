//! Redis backend tests. Need a reachable server at `TASKLANE_REDIS_URL`
//! (default `redis://127.0.0.1:6379`); run with `--features db-tests`.

#![cfg(feature = "db-tests")]

use std::time::Duration;

use futures_util::StreamExt;
use tasklane_storage::{CacheStore, RedisCacheStore};

fn redis() -> Result<RedisCacheStore, String> {
    let url = std::env::var("TASKLANE_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisCacheStore::from_url(&url).map_err(|e| e.to_string())
}

fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{prefix}{nanos}:")
}

#[tokio::test]
async fn test_set_get_delete() -> Result<(), String> {
    let cache = redis()?;
    let key = format!("{}k", unique("tasklane-test:"));

    cache
        .set(&key, b"payload".to_vec(), Duration::from_secs(30))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(
        cache.get(&key).await.map_err(|e| e.to_string())?,
        Some(b"payload".to_vec())
    );

    cache.delete(&key).await.map_err(|e| e.to_string())?;
    assert_eq!(cache.get(&key).await.map_err(|e| e.to_string())?, None);
    Ok(())
}

#[tokio::test]
async fn test_prefix_delete_spans_scan_batches() -> Result<(), String> {
    let cache = redis()?;
    let prefix = unique("tasklane-test:listing:");
    let survivor = format!("{}other", unique("tasklane-test:keep:"));

    for i in 0..450 {
        cache
            .set(&format!("{prefix}{i}"), vec![1], Duration::from_secs(30))
            .await
            .map_err(|e| e.to_string())?;
    }
    cache
        .set(&survivor, vec![2], Duration::from_secs(30))
        .await
        .map_err(|e| e.to_string())?;

    let removed = cache
        .delete_by_prefix(&prefix)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(removed, 450);
    assert_eq!(
        cache.get(&survivor).await.map_err(|e| e.to_string())?,
        Some(vec![2])
    );
    cache.delete(&survivor).await.map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::test]
async fn test_publish_reaches_subscriber() -> Result<(), String> {
    let cache = redis()?;
    let channel = unique("tasklane-test:channel:");
    let mut messages = cache.subscribe(&channel).await.map_err(|e| e.to_string())?;

    cache
        .publish(&channel, b"hello".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    let received = tokio::time::timeout(Duration::from_secs(2), messages.next())
        .await
        .map_err(|_| "no message within 2s".to_string())?;
    assert_eq!(received, Some(b"hello".to_vec()));
    Ok(())
}
