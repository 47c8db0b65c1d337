//! Pending request queue.
//!
//! Mutating remote calls that fail are queued here and replayed later,
//! once per [`RequestQueue::drain`] call, in FIFO order. Entries that fail
//! again stay queued in their original order. Entries are never
//! de-duplicated: the same logical operation failing twice is queued twice.
//!
//! Whether the queue survives a restart is a policy choice
//! ([`QueuePersistence`]). In `Store` mode the queue is written to the
//! key-value store under [`QUEUE_KEY`] after every change.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{Record, RecordPatch};
use crate::remote::RemoteStore;
use crate::storage::KeyValueStore;

/// Key the queue is persisted under in `Store` mode.
pub const QUEUE_KEY: &str = "pendingRequests";

/// A mutating remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Create { record: Record },
    Update { id: String, patch: RecordPatch },
    Delete { id: String },
}

impl Operation {
    /// Short name of the operation kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Id of the record the operation targets.
    #[must_use]
    pub fn target_id(&self) -> &str {
        match self {
            Self::Create { record } => &record.id,
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }

    /// Perform the call against `remote`.
    ///
    /// # Errors
    ///
    /// Returns the remote's error unchanged.
    pub async fn replay<R: RemoteStore>(&self, remote: &R) -> Result<()> {
        match self {
            Self::Create { record } => remote.create(record).await.map(|_| ()),
            Self::Update { id, patch } => remote.update(id, patch).await.map(|_| ()),
            Self::Delete { id } => remote.delete(id).await,
        }
    }
}

/// A queued operation with the time it was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    #[serde(flatten)]
    pub operation: Operation,
    pub enqueued_at: DateTime<Utc>,
}

/// Whether queued operations survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePersistence {
    /// Process memory only; lost on exit.
    #[default]
    Memory,
    /// Written to the key-value store after every change.
    #[serde(alias = "persistent")]
    Store,
}

impl QueuePersistence {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for QueuePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub succeeded: usize,
    pub remaining: usize,
    /// Operations the remote accepted, in replay order.
    #[serde(skip)]
    pub applied: Vec<Operation>,
}

/// FIFO queue of failed mutating operations.
#[derive(Default)]
pub struct RequestQueue {
    entries: VecDeque<QueuedOperation>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl RequestQueue {
    /// A queue that lives in process memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A queue persisted in `store`, restored from its previous content.
    ///
    /// Unreadable persisted content is discarded with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn persistent(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let entries = match store.get(QUEUE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable request queue");
                VecDeque::new()
            }),
            None => VecDeque::new(),
        };
        Ok(Self {
            entries,
            store: Some(store),
        })
    }

    /// Build a queue for the given policy.
    ///
    /// # Errors
    ///
    /// Returns an error if a persistent queue cannot be restored.
    pub fn with_policy(policy: QueuePersistence, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        match policy {
            QueuePersistence::Memory => Ok(Self::in_memory()),
            QueuePersistence::Store => Self::persistent(store),
        }
    }

    /// Append an operation, stamped with the current time.
    pub fn enqueue(&mut self, operation: Operation) {
        debug!(kind = operation.kind(), id = operation.target_id(), "queueing request");
        self.entries.push_back(QueuedOperation {
            operation,
            enqueued_at: Utc::now(),
        });
        self.persist();
    }

    /// Replay every queued operation once, keeping the ones that fail.
    ///
    /// Taking `&mut self` makes concurrent drains of the same queue impossible.
    pub async fn drain<R: RemoteStore>(&mut self, remote: &R) -> DrainReport {
        if self.entries.is_empty() {
            return DrainReport::default();
        }

        let mut remaining = VecDeque::with_capacity(self.entries.len());
        let mut applied = Vec::new();

        while let Some(entry) = self.entries.pop_front() {
            match entry.operation.replay(remote).await {
                Ok(()) => applied.push(entry.operation),
                Err(e) => {
                    warn!(
                        kind = entry.operation.kind(),
                        id = entry.operation.target_id(),
                        error = %e,
                        "queued request failed, keeping it"
                    );
                    remaining.push_back(entry);
                }
            }
        }

        self.entries = remaining;
        self.persist();

        DrainReport {
            succeeded: applied.len(),
            remaining: self.entries.len(),
            applied,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued operations, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &QueuedOperation> {
        self.entries.iter()
    }

    /// Whether this queue writes through to a store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_string(&self.entries)
            .map_err(crate::Error::from)
            .and_then(|json| store.set(QUEUE_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist request queue");
        }
    }
}
