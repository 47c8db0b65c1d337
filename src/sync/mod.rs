//! Offline-first sync engine.
//!
//! - **Merge**: server-wins reconciliation of the cache with the remote
//! - **Queue**: failed mutating calls, replayed in order
//! - **Orchestrator**: the sync pass state machine with bounded retries
//! - **Scheduler**: periodic sync and health polling
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────┐   SyncEvent   ┌──────────────┐
//!   sync() ──────► │ SyncOrchestrator │ ────────────► │ SyncObserver │
//!                  └───┬─────┬─────┬──┘               └──────────────┘
//!                      │     │     │
//!          RemoteStore │     │     │ RequestQueue
//!                      ▼     │     ▼
//!                 (network)  │  pendingRequests
//!                            ▼
//!                       LocalCache (savedQuotes)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use qs::sync::{RequestQueue, SyncOrchestrator, TracingObserver};
//!
//! let orchestrator = SyncOrchestrator::new(remote, cache, RequestQueue::in_memory())
//!     .with_observer(Arc::new(TracingObserver));
//! let outcome = orchestrator.sync().await;
//! ```

mod backoff;
mod merge;
mod observer;
mod orchestrator;
mod queue;
mod scheduler;
mod types;

pub use backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, RetryPolicy, Sleeper, TokioSleeper};
pub use merge::{MergeOutcome, merge, prepare, valid_ids};
pub use observer::{ChannelObserver, SyncObserver, TracingObserver};
pub use orchestrator::SyncOrchestrator;
pub use queue::{DrainReport, Operation, QUEUE_KEY, QueuePersistence, QueuedOperation, RequestQueue};
pub use scheduler::{AutoSync, DEFAULT_AUTO_SYNC_INTERVAL, DEFAULT_HEALTH_POLL_INTERVAL, HealthMonitor};
pub use types::{MutationOutcome, SyncCounts, SyncEvent, SyncOutcome, SyncReport, SyncState};
