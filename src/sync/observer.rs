//! Sync event observers.
//!
//! The orchestrator reports conflicts, retries and completions to every
//! registered [`SyncObserver`] instead of invoking global callbacks.

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::types::SyncEvent;

/// Receives [`SyncEvent`]s. Called synchronously; must not block.
pub trait SyncObserver: Send + Sync {
    fn notify(&self, event: &SyncEvent);
}

/// Turns events into log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn notify(&self, event: &SyncEvent) {
        match event {
            SyncEvent::AlreadyInProgress => debug!("sync skipped, already in progress"),
            SyncEvent::StorageReset { reason } => {
                warn!(%reason, "local cache was reset");
            }
            SyncEvent::ConflictsFound { conflicts } => {
                let ids: Vec<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
                warn!(count = conflicts.len(), ?ids, "server versions replaced local edits");
            }
            SyncEvent::PushFailed { failed } => {
                warn!(failed, "some local quotes could not be pushed");
            }
            SyncEvent::Retrying {
                attempt,
                max,
                delay,
                reason,
            } => {
                warn!(attempt, max, delay_ms = delay.as_millis(), %reason, "sync failed, retrying");
            }
            SyncEvent::RecordsUpdated(counts) => info!(
                merged = counts.merged,
                conflicts = counts.conflicts,
                pushed = counts.pushed,
                push_failed = counts.push_failed,
                queue_succeeded = counts.queue_succeeded,
                queue_remaining = counts.queue_remaining,
                "sync complete"
            ),
            SyncEvent::Failed { attempts, reason } => {
                error!(attempts, %reason, "sync failed");
            }
        }
    }
}

/// Forwards events to a broadcast channel.
///
/// Events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: broadcast::Sender<SyncEvent>,
}

impl ChannelObserver {
    /// Create an observer and its first receiver.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<SyncEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl SyncObserver for ChannelObserver {
    fn notify(&self, event: &SyncEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
pub use testing::RecordingObserver;
