//! Sync orchestrator.
//!
//! Drives one sync pass at a time through
//! `HealthChecking → Fetching → Merging → PushingLocalOnly → DrainingQueue`,
//! retrying transient failures with bounded exponential backoff:
//!
//! ```text
//!          ┌────────────── retry (attempt < max) ──────────────┐
//!          ▼                                                    │
//! Idle → HealthChecking → Fetching → Merging → PushingLocalOnly → DrainingQueue → Idle
//!          │ unhealthy      │ error
//!          └────────────────┴──────────→ Retrying ──(exhausted)──→ Failed → Idle
//! ```
//!
//! A second `sync()` call while a pass is running is rejected, not queued.
//! The orchestrator also owns the mutation path (create/update/delete),
//! which falls back to the request queue when the remote is unavailable.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Conflict, Record, RecordPatch, Resolution};
use crate::remote::RemoteStore;
use crate::storage::LocalCache;
use crate::validate::{normalized, validate_record};

use super::backoff::{RetryPolicy, Sleeper, TokioSleeper};
use super::merge::{MergeOutcome, merge, valid_ids};
use super::observer::SyncObserver;
use super::queue::{DrainReport, Operation, QueuedOperation, RequestQueue};
use super::types::{MutationOutcome, SyncCounts, SyncEvent, SyncOutcome, SyncReport, SyncState};

/// Coordinates the remote, the local cache and the request queue.
pub struct SyncOrchestrator<R: RemoteStore, Z: Sleeper = TokioSleeper> {
    remote: R,
    cache: LocalCache,
    queue: AsyncMutex<RequestQueue>,
    policy: RetryPolicy,
    sleeper: Z,
    observers: Vec<Arc<dyn SyncObserver>>,
    syncing: AtomicBool,
    state: Mutex<SyncState>,
    retry_count: AtomicU32,
    server_available: AtomicBool,
}

/// Holds the re-entrancy flag for the duration of a pass.
///
/// Dropping it (on return, error or cancellation) clears the flag and puts
/// the state back to `Idle`.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a Mutex<SyncState>,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a Mutex<SyncState>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, state })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SyncState::Idle;
        self.flag.store(false, Ordering::Release);
    }
}

/// `patch` restricted to the fields it sets, with values from `updated`.
fn normalized_patch(patch: &RecordPatch, updated: &Record) -> RecordPatch {
    RecordPatch {
        text: patch.text.as_ref().map(|_| updated.text.clone()),
        category: patch.category.as_ref().map(|_| updated.category.clone()),
        author: patch.author.as_ref().map(|_| updated.author.clone()),
        editable: patch.editable.map(|_| updated.editable),
    }
}

/// Local work done by a pass before the queue drain.
struct PushResult {
    attempted: usize,
    failed: usize,
}

impl<R: RemoteStore> SyncOrchestrator<R> {
    /// Create an orchestrator with the default retry policy and real timers.
    pub fn new(remote: R, cache: LocalCache, queue: RequestQueue) -> Self {
        Self {
            remote,
            cache,
            queue: AsyncMutex::new(queue),
            policy: RetryPolicy::default(),
            sleeper: TokioSleeper,
            observers: Vec::new(),
            syncing: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            retry_count: AtomicU32::new(0),
            server_available: AtomicBool::new(true),
        }
    }
}

impl<R: RemoteStore, Z: Sleeper> SyncOrchestrator<R, Z> {
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the timer used between retries.
    pub fn with_sleeper<S: Sleeper>(self, sleeper: S) -> SyncOrchestrator<R, S> {
        SyncOrchestrator {
            remote: self.remote,
            cache: self.cache,
            queue: self.queue,
            policy: self.policy,
            sleeper,
            observers: self.observers,
            syncing: self.syncing,
            state: self.state,
            retry_count: self.retry_count,
            server_available: self.server_available,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    // ── Accessors ─────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.lock_state()
    }

    /// Failed attempts in the current pass.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Whether the last contact with the remote succeeded.
    #[must_use]
    pub fn is_server_available(&self) -> bool {
        self.server_available.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Snapshot of the queued operations, oldest first.
    pub async fn pending(&self) -> Vec<QueuedOperation> {
        self.queue.lock().await.entries().cloned().collect()
    }

    // ── Sync pass ─────────────────────────────────────────────

    /// Run one sync pass.
    ///
    /// Returns [`SyncOutcome::AlreadyInProgress`] immediately if a pass is
    /// already running.
    pub async fn sync(&self) -> SyncOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.syncing, &self.state) else {
            self.emit(&SyncEvent::AlreadyInProgress);
            return SyncOutcome::AlreadyInProgress;
        };

        self.retry_count.store(0, Ordering::Release);

        loop {
            let error = match self.run_pass().await {
                Ok(mut report) => {
                    report.attempts = self.retry_count() + 1;
                    self.retry_count.store(0, Ordering::Release);
                    self.set_state(SyncState::Idle);
                    self.emit(&SyncEvent::RecordsUpdated(report.counts));
                    return SyncOutcome::Completed(report);
                }
                Err(e) => e,
            };

            let attempts = self.retry_count.fetch_add(1, Ordering::AcqRel) + 1;
            let reason = error.to_string();

            if !error.is_transient() || !self.policy.allows_retry(attempts) {
                return self.fail(attempts, reason);
            }

            self.set_state(SyncState::Retrying);
            let delay = self.policy.delay_for(attempts);
            self.emit(&SyncEvent::Retrying {
                attempt: attempts,
                max: self.policy.max_retries,
                delay,
                reason,
            });
            self.sleeper.sleep(delay).await;
        }
    }

    fn fail(&self, attempts: u32, reason: String) -> SyncOutcome {
        self.set_state(SyncState::Failed);
        self.emit(&SyncEvent::Failed {
            attempts,
            reason: reason.clone(),
        });
        self.retry_count.store(0, Ordering::Release);
        self.set_state(SyncState::Idle);
        SyncOutcome::Failed { attempts, reason }
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        self.set_state(SyncState::HealthChecking);
        if !self.check_health().await {
            return Err(Error::Network("server failed its health check".to_string()));
        }

        self.set_state(SyncState::Fetching);
        let server = self.remote.fetch_all().await.inspect_err(|_| {
            self.server_available.store(false, Ordering::Release);
        })?;

        self.set_state(SyncState::Merging);
        let load = self.cache.load()?;
        if let Some(reason) = &load.reset {
            self.emit(&SyncEvent::StorageReset {
                reason: reason.clone(),
            });
        }
        let outcome = merge(&load.records, &server);
        self.cache.save(&outcome.merged)?;
        debug!(
            local = load.records.len(),
            server = server.len(),
            merged = outcome.merged.len(),
            conflicts = outcome.conflicts.len(),
            "merged"
        );
        if !outcome.conflicts.is_empty() {
            self.emit(&SyncEvent::ConflictsFound {
                conflicts: outcome.conflicts.clone(),
            });
        }

        self.set_state(SyncState::PushingLocalOnly);
        let push = self.push_local_only(&outcome, &valid_ids(&server)).await?;
        if push.failed > 0 {
            self.emit(&SyncEvent::PushFailed {
                failed: push.failed,
            });
        }

        self.set_state(SyncState::DrainingQueue);
        let drain = self.drain_queue().await?;

        Ok(SyncReport {
            counts: SyncCounts {
                merged: outcome.merged.len(),
                conflicts: outcome.conflicts.len(),
                pushed: push.attempted,
                push_failed: push.failed,
                queue_succeeded: drain.succeeded,
                queue_remaining: drain.remaining,
            },
            conflicts: outcome.conflicts,
            storage_reset: load.reset,
            attempts: 1,
        })
    }

    /// Create every local-only record on the remote.
    ///
    /// Failures are counted, not queued. When the remote assigns a new id
    /// the cache entry is re-keyed so the next pass does not push it again.
    async fn push_local_only(
        &self,
        outcome: &MergeOutcome,
        server_ids: &HashSet<String>,
    ) -> Result<PushResult> {
        let mut result = PushResult {
            attempted: 0,
            failed: 0,
        };

        for record in outcome.local_only(server_ids) {
            result.attempted += 1;
            match self.remote.create(record).await {
                Ok(created) => {
                    if !created.id.is_empty() && created.id != record.id {
                        debug!(local = %record.id, remote = %created.id, "remote assigned a new id");
                        self.cache.replace(
                            &record.id,
                            Record {
                                id: created.id,
                                ..record.clone()
                            },
                        )?;
                    }
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "failed to push local quote");
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }

    // ── Queue and health ──────────────────────────────────────

    /// Probe the remote and remember the answer.
    pub async fn check_health(&self) -> bool {
        let healthy = self.remote.health_check().await;
        let was = self.server_available.swap(healthy, Ordering::AcqRel);
        if was != healthy {
            info!(available = healthy, "server availability changed");
        }
        healthy
    }

    /// Replay queued operations once and bring the cache in line with the
    /// ones the remote accepted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache cannot be written. Replays that
    /// already reached the remote are not retried.
    pub async fn drain_queue(&self) -> Result<DrainReport> {
        let report = self.queue.lock().await.drain(&self.remote).await;
        if report.succeeded > 0 || report.remaining > 0 {
            debug!(
                succeeded = report.succeeded,
                remaining = report.remaining,
                "drained request queue"
            );
        }
        for operation in &report.applied {
            self.apply_replayed(operation)?;
        }
        Ok(report)
    }

    /// Mirror a replayed write in the cache.
    ///
    /// Creates are left to the next fetch, which brings back the record
    /// under whatever id the remote assigned.
    fn apply_replayed(&self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::Create { .. } => {}
            Operation::Update { id, patch } => {
                if let Some(existing) = self.cache.get(id)? {
                    self.cache.upsert(normalized(&existing.patched(patch)))?;
                }
            }
            Operation::Delete { id } => {
                self.cache.remove(id)?;
            }
        }
        Ok(())
    }

    async fn enqueue(&self, operation: Operation) {
        self.queue.lock().await.enqueue(operation);
    }

    // ── Mutations ─────────────────────────────────────────────

    /// Create a record on the remote and cache it.
    ///
    /// The record is validated and normalized first. When the remote is
    /// unavailable or the call fails, the create is queued and the cache
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for an invalid record, or a storage
    /// error if the cache cannot be written.
    pub async fn create_record(&self, record: Record) -> Result<MutationOutcome> {
        validate_record(&record)?;
        let record = normalized(&record);

        let operation = Operation::Create {
            record: record.clone(),
        };
        let Some(created) = self
            .attempt(operation, |remote| remote.create(&record))
            .await
        else {
            return Ok(MutationOutcome::Queued);
        };

        let id = if created.id.is_empty() {
            record.id.clone()
        } else {
            created.id
        };
        let stored = Record { id, ..record };
        self.cache.upsert(stored.clone())?;
        Ok(MutationOutcome::Applied(Some(stored)))
    }

    /// Apply a partial update to a locally created record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if the id is not cached,
    /// [`Error::NotEditable`] for records that are not editable,
    /// [`Error::InvalidArgument`] for an empty patch and
    /// [`Error::InvalidRecord`] if the result would be invalid.
    pub async fn update_record(&self, id: &str, patch: RecordPatch) -> Result<MutationOutcome> {
        let existing = self.editable_record(id)?;
        if patch.is_empty() {
            return Err(Error::InvalidArgument("nothing to update".to_string()));
        }
        let updated = existing.patched(&patch);
        validate_record(&updated)?;
        let updated = normalized(&updated);
        // Send the normalized values so the remote and the cache agree.
        let patch = normalized_patch(&patch, &updated);

        let operation = Operation::Update {
            id: id.to_string(),
            patch: patch.clone(),
        };
        if self
            .attempt(operation, |remote| remote.update(id, &patch))
            .await
            .is_none()
        {
            return Ok(MutationOutcome::Queued);
        }

        self.cache.upsert(updated.clone())?;
        Ok(MutationOutcome::Applied(Some(updated)))
    }

    /// Delete a locally created record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] or [`Error::NotEditable`] as for
    /// updates, or a storage error.
    pub async fn delete_record(&self, id: &str) -> Result<MutationOutcome> {
        self.editable_record(id)?;

        let operation = Operation::Delete { id: id.to_string() };
        if self
            .attempt(operation, |remote| remote.delete(id))
            .await
            .is_none()
        {
            return Ok(MutationOutcome::Queued);
        }

        self.cache.remove(id)?;
        Ok(MutationOutcome::Applied(None))
    }

    /// Undo a server-wins merge for one conflict.
    ///
    /// Writes the local version back into the cache and sends it to the
    /// remote as an update (queued when the remote is unavailable).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache cannot be written.
    pub async fn keep_local(&self, conflict: &Conflict) -> Result<MutationOutcome> {
        let local = normalized(&conflict.local);
        self.cache.upsert(local.clone())?;

        let patch = RecordPatch::from_record(&local);
        let operation = Operation::Update {
            id: local.id.clone(),
            patch: patch.clone(),
        };
        let id = local.id.clone();
        if self
            .attempt(operation, |remote| remote.update(&id, &patch))
            .await
            .is_none()
        {
            return Ok(MutationOutcome::Queued);
        }
        Ok(MutationOutcome::Applied(Some(local)))
    }

    /// Apply a manual resolution to a conflict reported by the last pass.
    ///
    /// # Errors
    ///
    /// See [`Self::keep_local`].
    pub async fn resolve(
        &self,
        conflict: &Conflict,
        resolution: Resolution,
    ) -> Result<MutationOutcome> {
        match resolution {
            Resolution::KeepServer => Ok(MutationOutcome::Applied(Some(conflict.server.clone()))),
            Resolution::KeepLocal => self.keep_local(conflict).await,
        }
    }

    fn editable_record(&self, id: &str) -> Result<Record> {
        let record = self
            .cache
            .get(id)?
            .ok_or_else(|| Error::RecordNotFound { id: id.to_string() })?;
        if !record.editable {
            return Err(Error::NotEditable { id: id.to_string() });
        }
        Ok(record)
    }

    /// Run `call` against the remote unless it is known to be down.
    ///
    /// Returns `None` after queueing `operation` when the remote is
    /// unavailable or the call fails.
    async fn attempt<'s, T, F, Fut>(&'s self, operation: Operation, call: F) -> Option<T>
    where
        F: FnOnce(&'s R) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.is_server_available() {
            debug!(kind = operation.kind(), "server unavailable, queueing");
            self.enqueue(operation).await;
            return None;
        }

        match call(&self.remote).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(kind = operation.kind(), id = operation.target_id(), error = %e, "remote call failed, queueing");
                self.server_available.store(false, Ordering::Release);
                self.enqueue(operation).await;
                None
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SyncState) {
        let mut state = self.lock_state();
        if *state != next {
            debug!(from = %*state, to = %next, "sync state");
            *state = next;
        }
    }

    fn emit(&self, event: &SyncEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::remote::mock::MockRemote;
    use crate::storage::{KeyValueStore, MemoryKvStore, SqliteKvStore};
    use crate::sync::backoff::RecordingSleeper;
    use crate::sync::observer::RecordingObserver;

    fn rec(id: &str, text: &str) -> Record {
        Record {
            id: id.to_string(),
            text: text.to_string(),
            category: "X".to_string(),
            author: "Bob".to_string(),
            editable: true,
        }
    }

    struct Harness {
        orchestrator: SyncOrchestrator<MockRemote, Arc<RecordingSleeper>>,
        store: Arc<dyn KeyValueStore>,
        sleeper: Arc<RecordingSleeper>,
        observer: Arc<RecordingObserver>,
    }

    fn harness(remote: MockRemote, local: &[Record]) -> Harness {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let cache = LocalCache::new(store.clone());
        cache.save(local).unwrap();

        let sleeper = Arc::new(RecordingSleeper::default());
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = SyncOrchestrator::new(remote, cache, RequestQueue::in_memory())
            .with_sleeper(sleeper.clone())
            .with_observer(observer.clone());

        Harness {
            orchestrator,
            store,
            sleeper,
            observer,
        }
    }

    fn cached(h: &Harness) -> Vec<Record> {
        h.orchestrator.cache().load().unwrap().records
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed pass, got {other:?}"),
        }
    }

    // ── Scenarios ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_scenario_local_only_record_is_pushed() {
        let h = harness(MockRemote::default(), &[rec("1", "A")]);

        let report = completed(h.orchestrator.sync().await);

        assert_eq!(cached(&h), vec![rec("1", "A")]);
        assert_eq!(h.orchestrator.remote().created.lock().unwrap().clone(), vec![rec("1", "A")]);
        assert_eq!(report.counts.pushed, 1);
        assert_eq!(report.counts.push_failed, 0);
        assert_eq!(report.counts.merged, 1);
        assert_eq!(h.orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_scenario_server_wins_and_conflict_is_reported() {
        let h = harness(MockRemote::with_records(vec![rec("1", "B")]), &[rec("1", "A")]);

        let report = completed(h.orchestrator.sync().await);

        assert_eq!(cached(&h), vec![rec("1", "B")]);
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.conflicts[0].fields.text);
        assert_eq!(report.counts.pushed, 0);

        let found = h.observer.events().into_iter().find_map(|e| match e {
            SyncEvent::ConflictsFound { conflicts } => Some(conflicts),
            _ => None,
        });
        let conflicts = found.expect("conflict event");
        assert_eq!(conflicts[0].local.text, "A");
        assert_eq!(conflicts[0].server.text, "B");
    }

    #[tokio::test]
    async fn test_scenario_unhealthy_remote_fails_after_three_checks() {
        let remote = MockRemote::default();
        remote.set_healthy(false);
        let h = harness(remote, &[rec("1", "A")]);

        let outcome = h.orchestrator.sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed { attempts: 3, .. }), "{outcome:?}");
        assert_eq!(h.orchestrator.remote().health_check_count(), 3);
        assert_eq!(h.orchestrator.remote().fetches.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.sleeper.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(h.observer.count(|e| matches!(e, SyncEvent::Retrying { .. })), 2);
        assert_eq!(h.observer.count(|e| matches!(e, SyncEvent::Failed { .. })), 1);
        assert_eq!(h.orchestrator.retry_count(), 0);
        assert_eq!(h.orchestrator.state(), SyncState::Idle);
        assert!(!h.orchestrator.is_syncing());
        assert_eq!(cached(&h), vec![rec("1", "A")]);
    }

    #[tokio::test]
    async fn test_scenario_queued_create_is_replayed() {
        let remote = MockRemote::default();
        remote.set_fail_writes(true);
        let h = harness(remote, &[]);

        let outcome = h.orchestrator.create_record(rec("q1", "A")).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Queued);
        assert_eq!(h.orchestrator.queue_len().await, 1);
        assert!(cached(&h).is_empty());

        h.orchestrator.remote().set_fail_writes(false);
        let report = completed(h.orchestrator.sync().await);

        assert_eq!(report.counts.queue_succeeded, 1);
        assert_eq!(report.counts.queue_remaining, 0);
        assert_eq!(h.orchestrator.queue_len().await, 0);
        assert_eq!(h.orchestrator.remote().records(), vec![rec("q1", "A")]);
    }

    // ── Retry loop ────────────────────────────────────────────

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let remote = MockRemote::with_records(vec![rec("1", "A")]);
        remote.script_health(&[false]);
        let h = harness(remote, &[]);

        let report = completed(h.orchestrator.sync().await);

        assert_eq!(report.attempts, 2);
        assert_eq!(h.orchestrator.remote().health_check_count(), 2);
        assert_eq!(h.orchestrator.retry_count(), 0);
        assert_eq!(cached(&h), vec![rec("1", "A")]);
        assert_eq!(h.observer.count(|e| matches!(e, SyncEvent::RecordsUpdated(_))), 1);
    }

    #[tokio::test]
    async fn test_format_error_is_retried() {
        let remote = MockRemote::default();
        remote.set_bad_format(true);
        let h = harness(remote, &[rec("1", "A")]);

        let outcome = h.orchestrator.sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed { attempts: 3, .. }));
        assert_eq!(h.orchestrator.remote().fetches.load(Ordering::SeqCst), 3);
        assert_eq!(cached(&h), vec![rec("1", "A")]);
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_server_unavailable() {
        let remote = MockRemote::default();
        remote.set_fail_fetch(true);
        let h = harness(remote, &[]);
        h.orchestrator.sync().await;
        assert!(!h.orchestrator.is_server_available());
    }

    #[tokio::test]
    async fn test_retry_counter_resets_between_passes() {
        let remote = MockRemote::default();
        remote.set_healthy(false);
        let h = harness(remote, &[]);

        h.orchestrator.sync().await;
        h.orchestrator.sync().await;

        assert_eq!(h.orchestrator.remote().health_check_count(), 6);
        assert_eq!(h.observer.count(|e| matches!(e, SyncEvent::Failed { attempts: 3, .. })), 2);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let remote = MockRemote::default();
        remote.set_healthy(false);
        let h = harness(remote, &[]);
        let orchestrator = h
            .orchestrator
            .with_policy(RetryPolicy::new(2, Duration::from_millis(10)));

        let outcome = orchestrator.sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed { attempts: 2, .. }));
        assert_eq!(h.sleeper.sleeps(), vec![Duration::from_millis(10)]);
    }

    // ── Re-entrancy ───────────────────────────────────────────

    struct GateSleeper(Arc<Notify>);

    impl Sleeper for GateSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.0.notified().await;
        }
    }

    #[tokio::test]
    async fn test_second_sync_is_rejected_while_running() {
        let remote = MockRemote::default();
        remote.script_health(&[false]);
        let gate = Arc::new(Notify::new());
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                remote,
                LocalCache::new(Arc::new(MemoryKvStore::new())),
                RequestQueue::in_memory(),
            )
            .with_sleeper(GateSleeper(gate.clone()))
            .with_observer(observer.clone()),
        );

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.sync().await }
        });

        while orchestrator.state() != SyncState::Retrying {
            tokio::task::yield_now().await;
        }
        assert!(orchestrator.is_syncing());
        assert_eq!(orchestrator.retry_count(), 1);

        assert_eq!(orchestrator.sync().await, SyncOutcome::AlreadyInProgress);
        assert_eq!(observer.count(|e| matches!(e, SyncEvent::AlreadyInProgress)), 1);

        gate.notify_one();
        assert!(first.await.unwrap().is_completed());
        assert!(!orchestrator.is_syncing());
        assert!(orchestrator.sync().await.is_completed());
    }

    #[tokio::test]
    async fn test_cancelled_pass_releases_guard() {
        let remote = MockRemote::default();
        remote.script_health(&[false]);
        let gate = Arc::new(Notify::new());
        let orchestrator = SyncOrchestrator::new(
            remote,
            LocalCache::new(Arc::new(MemoryKvStore::new())),
            RequestQueue::in_memory(),
        )
        .with_sleeper(GateSleeper(gate));

        let result = tokio::time::timeout(Duration::from_millis(50), orchestrator.sync()).await;
        assert!(result.is_err());
        assert!(!orchestrator.is_syncing());
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }

    // ── Pass details ──────────────────────────────────────────

    #[tokio::test]
    async fn test_push_failures_are_counted_not_queued() {
        let remote = MockRemote::default();
        remote.set_fail_writes(true);
        let h = harness(remote, &[rec("1", "A"), rec("2", "B")]);

        let report = completed(h.orchestrator.sync().await);

        assert_eq!(report.counts.pushed, 2);
        assert_eq!(report.counts.push_failed, 2);
        assert_eq!(h.orchestrator.queue_len().await, 0);
        assert_eq!(
            h.observer
                .count(|e| *e == SyncEvent::PushFailed { failed: 2 }),
            1
        );
        assert_eq!(cached(&h).len(), 2);
    }

    #[tokio::test]
    async fn test_remote_assigned_id_rekeys_cache() {
        let remote = MockRemote::default();
        remote.assign_ids_from(100);
        let h = harness(remote, &[rec("local-1", "A")]);

        completed(h.orchestrator.sync().await);
        assert_eq!(cached(&h), vec![rec("100", "A")]);

        // The next pass sees the record on the server and pushes nothing.
        let report = completed(h.orchestrator.sync().await);
        assert_eq!(report.counts.pushed, 0);
        assert!(report.conflicts.is_empty());
        assert_eq!(h.orchestrator.remote().records().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_cache_is_reset_once() {
        let h = harness(MockRemote::with_records(vec![rec("1", "A")]), &[]);
        h.store.set("savedQuotes", "{not json").unwrap();

        let report = completed(h.orchestrator.sync().await);

        assert!(report.storage_reset.is_some());
        assert_eq!(h.observer.count(|e| matches!(e, SyncEvent::StorageReset { .. })), 1);
        assert_eq!(cached(&h), vec![rec("1", "A")]);
    }

    #[tokio::test]
    async fn test_invalid_records_are_dropped_from_cache() {
        let mut bad = rec("2", "");
        bad.category = String::new();
        let h = harness(MockRemote::with_records(vec![bad]), &[rec("", "no id")]);

        let report = completed(h.orchestrator.sync().await);

        assert_eq!(report.counts.merged, 0);
        assert!(cached(&h).is_empty());
        assert_eq!(report.counts.pushed, 0);
    }

    #[tokio::test]
    async fn test_pass_survives_queue_failures() {
        let remote = MockRemote::default();
        let h = harness(remote, &[]);
        h.orchestrator.server_available.store(false, Ordering::SeqCst);
        h.orchestrator.cache().save(&[rec("7", "A")]).unwrap();
        h.orchestrator.delete_record("7").await.unwrap();
        h.orchestrator
            .update_record(
                "7",
                RecordPatch {
                    text: Some("B".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // The delete succeeds; the update of the now-missing id fails and stays.
        let report = completed(h.orchestrator.sync().await);
        assert_eq!(report.counts.queue_succeeded, 1);
        assert_eq!(report.counts.queue_remaining, 1);
        assert_eq!(h.orchestrator.pending().await[0].operation.kind(), "update");
    }

    #[tokio::test]
    async fn test_storage_error_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKvStore::open(&dir.path().join("quotes.db")).unwrap());
        let cache = LocalCache::with_key(store, "savedQuotes");
        let remote = MockRemote::with_records(vec![rec("1", "A")]);
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = SyncOrchestrator::new(remote, cache, RequestQueue::in_memory())
            .with_sleeper(RecordingSleeper::default())
            .with_observer(observer.clone());

        // Swap the table out from under the store so every read fails.
        let conn = rusqlite::Connection::open(dir.path().join("quotes.db")).unwrap();
        conn.execute_batch("DROP TABLE kv_store").unwrap();

        let outcome = orchestrator.sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed { attempts: 1, .. }), "{outcome:?}");
        assert_eq!(observer.count(|e| matches!(e, SyncEvent::Retrying { .. })), 0);
    }

    // ── Mutations ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_applies_and_caches() {
        let h = harness(MockRemote::default(), &[]);

        let outcome = h
            .orchestrator
            .create_record(rec("n1", "  New quote "))
            .await
            .unwrap();

        let stored = rec("n1", "New quote");
        assert_eq!(outcome, MutationOutcome::Applied(Some(stored.clone())));
        assert_eq!(cached(&h), vec![stored]);
    }

    #[tokio::test]
    async fn test_create_uses_remote_id() {
        let remote = MockRemote::default();
        remote.assign_ids_from(42);
        let h = harness(remote, &[]);

        h.orchestrator.create_record(rec("n1", "A")).await.unwrap();
        assert_eq!(cached(&h)[0].id, "42");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_record() {
        let h = harness(MockRemote::default(), &[]);
        let err = h.orchestrator.create_record(rec("n1", " ")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
        assert_eq!(h.orchestrator.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_write_marks_unavailable_and_skips_network_after() {
        let remote = MockRemote::default();
        remote.set_fail_writes(true);
        let h = harness(remote, &[]);

        h.orchestrator.create_record(rec("a", "A")).await.unwrap();
        assert!(!h.orchestrator.is_server_available());

        h.orchestrator.remote().set_fail_writes(false);
        let outcome = h.orchestrator.create_record(rec("b", "B")).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Queued);
        assert!(h.orchestrator.remote().created.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.queue_len().await, 2);

        assert!(h.orchestrator.check_health().await);
        assert!(h.orchestrator.is_server_available());
    }

    #[tokio::test]
    async fn test_update_and_delete_rules() {
        let mut readonly = rec("s1", "Server quote");
        readonly.editable = false;
        let h = harness(MockRemote::with_records(vec![rec("1", "A")]), &[rec("1", "A"), readonly]);

        let err = h
            .orchestrator
            .update_record("nope", RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));

        let err = h.orchestrator.delete_record("s1").await.unwrap_err();
        assert!(matches!(err, Error::NotEditable { .. }));

        let err = h
            .orchestrator
            .update_record("1", RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let outcome = h
            .orchestrator
            .update_record(
                "1",
                RecordPatch {
                    text: Some("Changed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Applied(Some(rec("1", "Changed"))));
        assert_eq!(h.orchestrator.remote().records()[0].text, "Changed");

        let outcome = h.orchestrator.delete_record("1").await.unwrap();
        assert_eq!(outcome, MutationOutcome::Applied(None));
        assert_eq!(cached(&h).len(), 1);
        assert!(h.orchestrator.remote().records().is_empty());
    }

    #[tokio::test]
    async fn test_offline_delete_stays_deleted_across_passes() {
        let h = harness(MockRemote::with_records(vec![rec("7", "A")]), &[rec("7", "A")]);
        h.orchestrator.server_available.store(false, Ordering::Release);

        let outcome = h.orchestrator.delete_record("7").await.unwrap();
        assert_eq!(outcome, MutationOutcome::Queued);
        assert_eq!(cached(&h), vec![rec("7", "A")]);

        let first = completed(h.orchestrator.sync().await);
        assert_eq!(first.counts.queue_succeeded, 1);
        assert!(h.orchestrator.remote().records().is_empty());
        assert!(cached(&h).is_empty());

        let second = completed(h.orchestrator.sync().await);
        assert_eq!(second.counts.pushed, 0);
        assert!(h.orchestrator.remote().records().is_empty());
        assert!(h.orchestrator.remote().created.lock().unwrap().is_empty());
        assert!(cached(&h).is_empty());
    }

    #[tokio::test]
    async fn test_offline_update_is_not_reported_as_conflict() {
        let h = harness(MockRemote::with_records(vec![rec("7", "A")]), &[rec("7", "A")]);
        h.orchestrator.server_available.store(false, Ordering::Release);

        let patch = RecordPatch {
            text: Some("B".into()),
            ..Default::default()
        };
        let outcome = h.orchestrator.update_record("7", patch).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Queued);

        let first = completed(h.orchestrator.sync().await);
        assert_eq!(first.counts.queue_succeeded, 1);
        assert_eq!(h.orchestrator.remote().records(), vec![rec("7", "B")]);
        assert_eq!(cached(&h), vec![rec("7", "B")]);

        let second = completed(h.orchestrator.sync().await);
        assert!(second.conflicts.is_empty());
        assert_eq!(cached(&h), vec![rec("7", "B")]);
    }

    #[tokio::test]
    async fn test_update_sends_normalized_values() {
        let h = harness(MockRemote::with_records(vec![rec("1", "A")]), &[rec("1", "A")]);

        let patch = RecordPatch {
            text: Some("  Trimmed  ".into()),
            author: Some("   ".into()),
            ..Default::default()
        };
        let outcome = h.orchestrator.update_record("1", patch).await.unwrap();

        let mut expected = rec("1", "Trimmed");
        expected.author = "Unknown".to_string();
        assert_eq!(outcome, MutationOutcome::Applied(Some(expected.clone())));

        let sent = h.orchestrator.remote().updated.lock().unwrap()[0].1.clone();
        assert_eq!(
            sent,
            RecordPatch {
                text: Some("Trimmed".into()),
                author: Some("Unknown".into()),
                ..Default::default()
            }
        );
        assert_eq!(h.orchestrator.remote().records(), vec![expected.clone()]);
        assert_eq!(cached(&h), vec![expected]);
    }

    #[tokio::test]
    async fn test_keep_local_restores_and_updates_remote() {
        let h = harness(MockRemote::with_records(vec![rec("1", "B")]), &[rec("1", "A")]);
        let report = completed(h.orchestrator.sync().await);
        let conflict = &report.conflicts[0];

        let outcome = h
            .orchestrator
            .resolve(conflict, Resolution::KeepLocal)
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Applied(Some(rec("1", "A"))));
        assert_eq!(cached(&h), vec![rec("1", "A")]);
        assert_eq!(h.orchestrator.remote().records()[0].text, "A");

        // The next pass agrees with itself.
        let report = completed(h.orchestrator.sync().await);
        assert!(report.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_keep_server_is_a_no_op() {
        let h = harness(MockRemote::with_records(vec![rec("1", "B")]), &[rec("1", "A")]);
        let report = completed(h.orchestrator.sync().await);

        h.orchestrator
            .resolve(&report.conflicts[0], Resolution::KeepServer)
            .await
            .unwrap();

        assert_eq!(cached(&h), vec![rec("1", "B")]);
        assert!(h.orchestrator.remote().updated.lock().unwrap().is_empty());
    }
}
