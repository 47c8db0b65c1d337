//! Watch command: periodic sync plus health polling until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Error, Result};
use crate::sync::{AutoSync, ChannelObserver, HealthMonitor, SyncEvent, TracingObserver};

use super::{build_orchestrator, load_settings, open_store, print_json, runtime};

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if setup fails or the signal handler cannot be installed.
pub fn execute(
    interval: Option<u64>,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_settings(server)?;
    let interval = interval.map_or_else(|| config.auto_sync_interval(), Duration::from_secs);
    if interval.is_zero() {
        return Err(Error::InvalidArgument("--interval must be positive".into()));
    }

    let store = open_store(db_path)?;
    let (channel, mut events) = ChannelObserver::new(64);
    let orchestrator = Arc::new(
        build_orchestrator(store, &config, Arc::new(TracingObserver))?
            .with_observer(Arc::new(channel)),
    );

    let rt = runtime()?;
    rt.block_on(async {
        if !json {
            println!(
                "Watching {} every {}s (Ctrl-C to stop)",
                config.server_url.bold(),
                interval.as_secs()
            );
        }

        // First pass right away; the timer takes over from there.
        orchestrator.sync().await;

        let auto = AutoSync::start(orchestrator.clone(), interval);
        let monitor = HealthMonitor::start(orchestrator.clone(), config.health_poll_interval());

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result.map_err(|e| Error::Other(format!("Failed to listen for Ctrl-C: {e}")))?;
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => report(&event, json)?,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        auto.stop();
        monitor.stop();
        if !json {
            println!("Stopped.");
        }
        Ok(())
    })
}

fn report(event: &SyncEvent, json: bool) -> Result<()> {
    if json {
        return print_json(event);
    }

    let stamp = chrono::Local::now().format("%H:%M:%S").to_string();
    match event {
        SyncEvent::RecordsUpdated(counts) => println!(
            "{} {} {} quotes, {} conflicts, {} pushed, {} queued pending",
            stamp.dimmed(),
            "synced".green(),
            counts.merged,
            counts.conflicts,
            counts.pushed,
            counts.queue_remaining
        ),
        SyncEvent::ConflictsFound { conflicts } => {
            let ids: Vec<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
            println!(
                "{} {} server kept for {}",
                stamp.dimmed(),
                "conflict".yellow(),
                ids.join(", ")
            );
        }
        SyncEvent::Retrying {
            attempt,
            max,
            delay,
            reason,
        } => println!(
            "{} {} attempt {attempt}/{max} failed ({reason}), next in {}ms",
            stamp.dimmed(),
            "retry".yellow(),
            delay.as_millis()
        ),
        SyncEvent::Failed { attempts, reason } => println!(
            "{} {} after {attempts} attempts: {reason}",
            stamp.dimmed(),
            "failed".red()
        ),
        SyncEvent::StorageReset { reason } => println!(
            "{} {} local cache reset ({reason})",
            stamp.dimmed(),
            "reset".yellow()
        ),
        SyncEvent::PushFailed { failed } => println!(
            "{} {} {failed} local quote(s) not pushed",
            stamp.dimmed(),
            "push".yellow()
        ),
        SyncEvent::AlreadyInProgress => {}
    }
    Ok(())
}
