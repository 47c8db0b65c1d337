//! Queue command: list requests waiting for the server.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::sync::{Operation, QueuePersistence, QueuedOperation, RequestQueue};

use super::{load_settings, open_store, print_json};

#[derive(Serialize)]
struct QueueOutput<'a> {
    persistent: bool,
    count: usize,
    pending: Vec<&'a QueuedOperation>,
}

/// Execute the queue command.
///
/// Only a store-backed queue outlives a command, so an in-memory policy
/// always reports an empty queue.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_settings(None)?;
    let persistent = config.queue_persistence == QueuePersistence::Store;

    let queue = if persistent {
        RequestQueue::persistent(open_store(db_path)?)?
    } else {
        RequestQueue::in_memory()
    };
    let pending: Vec<&QueuedOperation> = queue.entries().collect();

    if json {
        return print_json(&QueueOutput {
            persistent,
            count: pending.len(),
            pending,
        });
    }

    if !persistent {
        println!("Requests are queued in memory and do not outlive a command.");
        println!("Set \"queuePersistence\": \"store\" in the config to keep them between runs.");
        return Ok(());
    }
    if pending.is_empty() {
        println!("No pending requests.");
        return Ok(());
    }

    for entry in &pending {
        println!(
            "{} {} {} {}",
            entry.enqueued_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            format!("{:<6}", entry.operation.kind()).bold(),
            entry.operation.target_id(),
            describe(&entry.operation).dimmed()
        );
    }
    println!();
    println!("{} pending. Run `qs sync` once the server is reachable.", pending.len());
    Ok(())
}

fn describe(operation: &Operation) -> String {
    match operation {
        Operation::Create { record } => format!("\"{}\"", record.text),
        Operation::Update { patch, .. } => {
            let mut fields = Vec::new();
            if patch.text.is_some() {
                fields.push("text");
            }
            if patch.category.is_some() {
                fields.push("category");
            }
            if patch.author.is_some() {
                fields.push("author");
            }
            if patch.editable.is_some() {
                fields.push("editable");
            }
            format!("[{}]", fields.join(", "))
        }
        Operation::Delete { .. } => String::new(),
    }
}
