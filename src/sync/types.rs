//! Sync pass types: states, events, counts and outcomes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::model::{Conflict, Record};

/// Where the orchestrator is in a sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    HealthChecking,
    Fetching,
    Merging,
    PushingLocalOnly,
    DrainingQueue,
    Retrying,
    /// Terminal for one pass; the orchestrator returns to `Idle` right after.
    Failed,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HealthChecking => "health_checking",
            Self::Fetching => "fetching",
            Self::Merging => "merging",
            Self::PushingLocalOnly => "pushing_local_only",
            Self::DrainingQueue => "draining_queue",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one completed sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    /// Size of the merged collection written to the cache.
    pub merged: usize,
    /// Number of conflicts found.
    pub conflicts: usize,
    /// Local-only records sent to the remote (attempts).
    pub pushed: usize,
    /// How many of those pushes failed.
    pub push_failed: usize,
    /// Queued operations replayed successfully.
    pub queue_succeeded: usize,
    /// Queued operations still pending.
    pub queue_remaining: usize,
}

/// Full result of a completed sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub counts: SyncCounts,
    pub conflicts: Vec<Conflict>,
    /// Set when the local cache was unreadable and reset during this pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_reset: Option<String>,
    /// Number of attempts the pass took (1 when no retry was needed).
    pub attempts: u32,
}

/// What a call to `sync()` ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another pass was running; nothing was done.
    AlreadyInProgress,
    Completed(SyncReport),
    /// Retries were exhausted or a non-transient error occurred.
    Failed { attempts: u32, reason: String },
}

impl SyncOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Notifications delivered to [`super::SyncObserver`]s.
///
/// Each significant transition produces exactly one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A pass was requested while another was running.
    AlreadyInProgress,
    /// The local cache was unreadable and has been reset to empty.
    StorageReset { reason: String },
    /// The merge overwrote local versions with server versions.
    ConflictsFound { conflicts: Vec<Conflict> },
    /// Some local-only records could not be pushed.
    PushFailed { failed: usize },
    /// A transient failure; the pass will be retried after `delay`.
    Retrying {
        attempt: u32,
        max: u32,
        #[serde(rename = "delay_ms", serialize_with = "serialize_millis")]
        delay: Duration,
        reason: String,
    },
    /// The pass completed.
    RecordsUpdated(SyncCounts),
    /// The pass gave up.
    Failed { attempts: u32, reason: String },
}

fn serialize_millis<S: serde::Serializer>(delay: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

/// Result of a create/update/delete issued through the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The remote accepted the change and the cache was updated.
    /// Carries the stored record (none for deletes).
    Applied(Option<Record>),
    /// The remote was unavailable; the operation waits in the queue.
    Queued,
}
