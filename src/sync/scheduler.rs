//! Background timers.
//!
//! [`AutoSync`] runs a sync pass on a fixed interval. [`HealthMonitor`]
//! polls the remote while it is marked unavailable and drains the request
//! queue as soon as it comes back. Both stop when their handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::remote::RemoteStore;

use super::backoff::Sleeper;
use super::orchestrator::SyncOrchestrator;
use super::types::SyncOutcome;

/// Default period between automatic sync passes.
pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default period between health polls.
pub const DEFAULT_HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(30);

fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Periodic sync task.
#[derive(Debug)]
pub struct AutoSync {
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Start syncing every `interval`, beginning one interval from now.
    ///
    /// Passes rejected because another one is running are skipped silently.
    pub fn start<R, Z>(orchestrator: Arc<SyncOrchestrator<R, Z>>, interval: Duration) -> Self
    where
        R: RemoteStore + 'static,
        Z: Sleeper + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = ticker(interval);
            loop {
                ticker.tick().await;
                match orchestrator.sync().await {
                    SyncOutcome::AlreadyInProgress => debug!("auto sync skipped"),
                    SyncOutcome::Completed(report) => {
                        debug!(merged = report.counts.merged, "auto sync complete");
                    }
                    // Already reported through the observers.
                    SyncOutcome::Failed { .. } => {}
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "auto sync started");
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the timer. A pass already in flight is cancelled with it.
    pub fn stop(self) {}
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Health poller that drains the queue once the remote recovers.
#[derive(Debug)]
pub struct HealthMonitor {
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Poll every `period` while the remote is marked unavailable.
    pub fn start<R, Z>(orchestrator: Arc<SyncOrchestrator<R, Z>>, period: Duration) -> Self
    where
        R: RemoteStore + 'static,
        Z: Sleeper + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = ticker(period);
            loop {
                ticker.tick().await;
                poll_once(&orchestrator).await;
            }
        });
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One health poll. Returns true if the queue was drained.
async fn poll_once<R: RemoteStore, Z: Sleeper>(orchestrator: &SyncOrchestrator<R, Z>) -> bool {
    if orchestrator.is_server_available() {
        return false;
    }
    if !orchestrator.check_health().await {
        debug!("server still unavailable");
        return false;
    }
    if orchestrator.is_syncing() || orchestrator.queue_len().await == 0 {
        return false;
    }

    let report = match orchestrator.drain_queue().await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "replayed queued requests but could not update the cache");
            return true;
        }
    };
    info!(
        succeeded = report.succeeded,
        remaining = report.remaining,
        "server back, replayed queued requests"
    );
    true
}
