//! Task change notification listener.
//!
//! Every committed task write is announced on the cache service's pub/sub
//! channel as a JSON [`TaskEvent`]. This job subscribes to that channel and
//! logs what it sees, so replicas sharing one cache observe each other's
//! writes. Delivery is best-effort: a missed or undecodable message is logged
//! and skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tasklane_core::TaskEvent;
use tasklane_storage::CacheStore;
use tokio::sync::watch;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the listener's lifetime.
#[derive(Debug, Default)]
pub struct NotificationMetrics {
    /// Events decoded and logged
    pub received: AtomicU64,

    /// Messages that were not a valid `TaskEvent`
    pub malformed: AtomicU64,
}

impl NotificationMetrics {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Listen on `channel` until the shutdown signal fires, its sender is
/// dropped, or the subscription ends.
///
/// A failed subscription is logged and the task returns immediately; the
/// service keeps serving without fan-out.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// tokio::spawn(notification_listener(cache, NOTIFICATION_CHANNEL.to_string(), shutdown_rx));
/// // On shutdown
/// let _ = shutdown_tx.send(true);
/// ```
pub async fn notification_listener(
    cache: Arc<dyn CacheStore>,
    channel: String,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<NotificationMetrics> {
    let metrics = Arc::new(NotificationMetrics::default());

    let mut messages = match cache.subscribe(&channel).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(channel = %channel, error = %e, "Notification subscription failed");
            return metrics;
        }
    };
    tracing::info!(channel = %channel, "Notification listener started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Notification listener shutting down");
                    break;
                }
            }

            message = messages.next() => {
                let Some(payload) = message else {
                    tracing::warn!(channel = %channel, "Notification stream closed");
                    break;
                };
                handle_message(&payload, &metrics);
            }
        }
    }

    tracing::info!(
        received = metrics.received(),
        malformed = metrics.malformed(),
        "Notification listener stopped"
    );
    metrics
}

fn handle_message(payload: &[u8], metrics: &NotificationMetrics) {
    match serde_json::from_slice::<TaskEvent>(payload) {
        Ok(event) => {
            metrics.received.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                kind = ?event.kind,
                task_id = %event.task_id,
                version = ?event.version,
                "Task change notification"
            );
        }
        Err(e) => {
            metrics.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, bytes = payload.len(), "Malformed task notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tasklane_core::{TaskEventKind, TaskId};
    use tasklane_storage::{InMemoryCacheStore, NOTIFICATION_CHANNEL};

    #[tokio::test]
    async fn test_listener_counts_events_until_shutdown() -> Result<(), String> {
        let cache = Arc::new(InMemoryCacheStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(notification_listener(
            cache.clone(),
            NOTIFICATION_CHANNEL.to_string(),
            shutdown_rx,
        ));

        // Let the listener subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let event = TaskEvent {
            kind: TaskEventKind::Updated,
            task_id: TaskId::new(9),
            version: Some(2),
        };
        let payload = serde_json::to_vec(&event).map_err(|e| e.to_string())?;
        cache
            .publish(NOTIFICATION_CHANNEL, payload)
            .await
            .map_err(|e| e.to_string())?;
        cache
            .publish(NOTIFICATION_CHANNEL, b"not json".to_vec())
            .await
            .map_err(|e| e.to_string())?;

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).map_err(|e| e.to_string())?;

        let metrics = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .map_err(|_| "listener did not stop".to_string())?
            .map_err(|e| e.to_string())?;
        assert_eq!(metrics.received(), 1);
        assert_eq!(metrics.malformed(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_listener_stops_when_shutdown_sender_is_dropped() -> Result<(), String> {
        let cache = Arc::new(InMemoryCacheStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(notification_listener(
            cache,
            NOTIFICATION_CHANNEL.to_string(),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(shutdown_tx);

        let metrics = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .map_err(|_| "listener kept running after sender drop".to_string())?
            .map_err(|e| e.to_string())?;
        assert_eq!(metrics.received(), 0);
        Ok(())
    }

    #[test]
    fn test_handle_message_rejects_unknown_kind() {
        let metrics = NotificationMetrics::default();
        handle_message(br#"{"kind":"archived","task_id":1}"#, &metrics);
        handle_message(br#"{"kind":"deleted","task_id":1}"#, &metrics);
        assert_eq!(metrics.malformed(), 1);
        assert_eq!(metrics.received(), 1);
    }
}
