//! Sync command implementation.
//!
//! Runs a single pass in the foreground. Retries and failures are logged
//! by the tracing observer; the summary goes to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Conflict, Resolution};
use crate::sync::{MutationOutcome, SyncOutcome, SyncReport, TracingObserver};

use super::{build_orchestrator, load_settings, open_store, print_json, runtime};

#[derive(Serialize)]
struct SyncOutput<'a> {
    report: &'a SyncReport,
    kept_local: Vec<KeptLocal>,
}

#[derive(Serialize)]
struct KeptLocal {
    id: String,
    queued: bool,
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns [`Error::SyncFailed`] when the pass gives up, or a storage or
/// config error.
pub fn execute(
    keep_local: bool,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_settings(server)?;
    let store = open_store(db_path)?;
    let orchestrator = build_orchestrator(store, &config, Arc::new(TracingObserver))?;

    let rt = runtime()?;
    rt.block_on(async {
        let report = match orchestrator.sync().await {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::AlreadyInProgress => return Err(Error::SyncInProgress),
            SyncOutcome::Failed { attempts, reason } => {
                return Err(Error::SyncFailed { attempts, reason });
            }
        };

        let mut kept = Vec::new();
        if keep_local {
            for conflict in &report.conflicts {
                let outcome = orchestrator.resolve(conflict, Resolution::KeepLocal).await?;
                kept.push(KeptLocal {
                    id: conflict.id.clone(),
                    queued: outcome == MutationOutcome::Queued,
                });
            }
        }

        if json {
            print_json(&SyncOutput {
                report: &report,
                kept_local: kept,
            })
        } else {
            print_report(&report, &kept);
            Ok(())
        }
    })
}

fn print_report(report: &SyncReport, kept: &[KeptLocal]) {
    let counts = &report.counts;

    println!("{}", "Sync complete".green().bold());
    if let Some(reason) = &report.storage_reset {
        println!("  {} local cache was reset ({reason})", "!".yellow());
    }
    println!("  Quotes:    {}", counts.merged);
    println!("  Conflicts: {}", counts.conflicts);
    if counts.push_failed > 0 {
        println!(
            "  Pushed:    {} ({} failed)",
            counts.pushed,
            counts.push_failed.to_string().red()
        );
    } else {
        println!("  Pushed:    {}", counts.pushed);
    }
    if counts.queue_succeeded > 0 || counts.queue_remaining > 0 {
        println!(
            "  Queue:     {} replayed, {} pending",
            counts.queue_succeeded, counts.queue_remaining
        );
    }
    if report.attempts > 1 {
        println!("  Attempts:  {}", report.attempts);
    }

    if report.conflicts.is_empty() {
        return;
    }

    println!();
    println!("{}", "Server versions kept for:".yellow().bold());
    for conflict in &report.conflicts {
        print_conflict(conflict);
    }

    if kept.is_empty() {
        println!();
        println!("Run `qs sync --keep-local` to restore the local versions instead.");
    } else {
        let queued = kept.iter().filter(|k| k.queued).count();
        println!();
        println!("Restored {} local version(s).", kept.len());
        if queued > 0 {
            println!("{queued} update(s) queued until the server is reachable.");
        }
    }
}

fn print_conflict(conflict: &Conflict) {
    println!(
        "  {} {}",
        conflict.id.bold(),
        format!("[{}]", conflict.fields.names().join(", ")).dimmed()
    );
    if conflict.fields.text {
        println!("      server: {}", conflict.server.text);
        println!("      local:  {}", conflict.local.text.dimmed());
    }
    if conflict.fields.category {
        println!(
            "      category: {} (local: {})",
            conflict.server.category, conflict.local.category
        );
    }
    if conflict.fields.author {
        println!(
            "      author: {} (local: {})",
            conflict.server.author, conflict.local.author
        );
    }
}
