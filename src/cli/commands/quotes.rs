//! Quote commands: list, categories, show, random, add, edit, delete.
//!
//! Reads come straight from the local cache. Writes go through the
//! orchestrator so they reach the server or the request queue.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{AddArgs, EditArgs};
use crate::config::{SyncConfig, ViewState, read_view_state, write_view_state};
use crate::error::{Error, Result};
use crate::model::{Record, RecordPatch, categories, filter_by_category, pick_random};
use crate::storage::KeyValueStore;
use crate::sync::{MutationOutcome, QueuePersistence, TracingObserver};

use super::{build_orchestrator, load_settings, open_cache, open_store, print_json, runtime};

const ALL: &str = "all";

#[derive(Serialize)]
struct ListOutput<'a> {
    quotes: Vec<&'a Record>,
    count: usize,
}

#[derive(Serialize)]
struct CategoryCount {
    category: String,
    count: usize,
}

#[derive(Serialize)]
struct MutationOutput<'a> {
    action: &'a str,
    #[serde(flatten)]
    outcome: &'a MutationOutcome,
    queue_persistent: bool,
}

// The cache logs its own reset warning.
fn load_records(store: Arc<dyn KeyValueStore>, config: &SyncConfig) -> Result<Vec<Record>> {
    Ok(open_cache(store, config).load()?.records)
}

// ── Reads ─────────────────────────────────────────────────────

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn list(
    category: Option<&str>,
    search: Option<&str>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_settings(None)?;
    let records = load_records(open_store(db_path)?, &config)?;

    let mut quotes = filter_by_category(&records, category.unwrap_or(ALL));
    if let Some(needle) = search {
        quotes.retain(|r| r.matches(needle));
    }

    if json {
        let count = quotes.len();
        return print_json(&ListOutput { quotes, count });
    }

    if quotes.is_empty() {
        println!("No quotes found.");
        if records.is_empty() {
            println!("Add one with `qs add \"text\" --category name` or run `qs sync`.");
        }
        return Ok(());
    }

    for record in &quotes {
        print_line(record);
    }
    println!();
    println!("{} quote(s)", quotes.len());
    Ok(())
}

/// Execute the categories command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn categories_cmd(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_settings(None)?;
    let records = load_records(open_store(db_path)?, &config)?;

    let counts: Vec<CategoryCount> = categories(&records)
        .into_iter()
        .map(|category| CategoryCount {
            count: records.iter().filter(|r| r.category == category).count(),
            category,
        })
        .collect();

    if json {
        return print_json(&counts);
    }

    if counts.is_empty() {
        println!("No categories yet.");
        return Ok(());
    }
    for entry in &counts {
        println!("{:<24} {}", entry.category, entry.count.to_string().dimmed());
    }
    Ok(())
}

/// Execute the show command.
///
/// With an id, shows that quote and remembers it. Without one, shows the
/// quote remembered last (if viewed in the last two hours).
///
/// # Errors
///
/// Returns [`Error::RecordNotFound`] if the id is not cached.
pub fn show(
    id: Option<&str>,
    category: Option<&str>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_settings(None)?;
    let store = open_store(db_path)?;

    let Some(id) = id else {
        let state = read_view_state(store.as_ref())?;
        if json {
            return print_json(&state);
        }
        match state {
            Some(state) => print_record(&state.quote),
            None => println!("No quote viewed recently. Use `qs show <id>`."),
        }
        return Ok(());
    };

    let records = load_records(store.clone(), &config)?;
    let category = category.unwrap_or(ALL);
    let visible = filter_by_category(&records, category);
    let index = visible
        .iter()
        .position(|r| r.id == id)
        .ok_or_else(|| Error::RecordNotFound { id: id.to_string() })?;
    let record = visible[index].clone();

    let state = ViewState::new(index, record, category);
    write_view_state(store.as_ref(), &state)?;

    if json {
        return print_json(&state);
    }
    print_record(&state.quote);
    Ok(())
}

/// Execute the random command.
///
/// Picks a quote other than the one on screen when possible and remembers
/// it for `show`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn random(category: Option<&str>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_settings(None)?;
    let store = open_store(db_path)?;
    let records = load_records(store.clone(), &config)?;
    let category = category.unwrap_or(ALL);

    let current = read_view_state(store.as_ref())?.map(|state| state.quote.id);
    let Some((index, record)) =
        pick_random(&records, category, current.as_deref(), &mut rand::rng())
    else {
        if json {
            return print_json(&Option::<ViewState>::None);
        }
        println!("There are no quotes to display.");
        return Ok(());
    };

    let state = ViewState::new(index, record.clone(), category);
    write_view_state(store.as_ref(), &state)?;

    if json {
        return print_json(&state);
    }
    print_record(&state.quote);
    Ok(())
}

// ── Writes ────────────────────────────────────────────────────

/// Execute the add command.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] for blank text or category.
pub fn add(
    args: &AddArgs,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut record = Record::new(&args.text, &args.category, args.author.as_deref());
    record.editable = !args.readonly;

    mutate("add", db_path, server, json, |orchestrator| async move {
        orchestrator.create_record(record).await
    })
}

/// Execute the edit command.
///
/// # Errors
///
/// Returns [`Error::RecordNotFound`], [`Error::NotEditable`] or a
/// validation error.
pub fn edit(
    args: &EditArgs,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
) -> Result<()> {
    let patch = RecordPatch {
        text: args.text.clone(),
        category: args.category.clone(),
        author: args.author.clone(),
        editable: None,
    };
    let id = args.id.clone();

    mutate("edit", db_path, server, json, |orchestrator| async move {
        orchestrator.update_record(&id, patch).await
    })
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns [`Error::RecordNotFound`] or [`Error::NotEditable`].
pub fn delete(
    id: &str,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
) -> Result<()> {
    let id = id.to_string();
    mutate("delete", db_path, server, json, |orchestrator| async move {
        orchestrator.delete_record(&id).await
    })
}

type Orchestrator = crate::sync::SyncOrchestrator<crate::remote::HttpRemoteStore>;

fn mutate<F, Fut>(
    action: &str,
    db_path: Option<&PathBuf>,
    server: Option<&str>,
    json: bool,
    op: F,
) -> Result<()>
where
    F: FnOnce(Arc<Orchestrator>) -> Fut,
    Fut: std::future::Future<Output = Result<MutationOutcome>>,
{
    let config = load_settings(server)?;
    let store = open_store(db_path)?;
    let orchestrator = Arc::new(build_orchestrator(store, &config, Arc::new(TracingObserver))?);

    let outcome = runtime()?.block_on(op(orchestrator))?;
    let queue_persistent = config.queue_persistence == QueuePersistence::Store;

    if json {
        return print_json(&MutationOutput {
            action,
            outcome: &outcome,
            queue_persistent,
        });
    }

    match &outcome {
        MutationOutcome::Applied(Some(record)) => {
            println!("{} {} {}", "✓".green(), past_tense(action), record.id.bold());
        }
        MutationOutcome::Applied(None) => println!("{} {}", "✓".green(), past_tense(action)),
        MutationOutcome::Queued => {
            println!("{} Server unavailable; request queued.", "!".yellow());
            if !queue_persistent {
                println!(
                    "  The queue is kept in memory and is lost when this command exits. \
                     Set \"queuePersistence\": \"store\" in the config to keep it."
                );
            }
        }
    }
    Ok(())
}

fn past_tense(action: &str) -> &'static str {
    match action {
        "add" => "Added",
        "edit" => "Updated",
        "delete" => "Deleted",
        _ => "Done",
    }
}

// ── Printing ──────────────────────────────────────────────────

fn print_line(record: &Record) {
    let lock = if record.editable { " " } else { "🔒" };
    println!(
        "{} {} {} {}",
        record.id.dimmed(),
        lock,
        truncate(&record.text, 70),
        format!("({}, {})", record.author, record.category).dimmed()
    );
}

fn print_record(record: &Record) {
    println!("“{}”", record.text.bold());
    println!("    - {}", record.author);
    println!();
    println!("  ID:       {}", record.id);
    println!("  Category: {}", record.category);
    if !record.editable {
        println!("  {}", "read-only".dimmed());
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijk", 8), "abcde...");
        assert_eq!(truncate("ééééé", 5), "ééééé");
    }

    #[test]
    fn test_past_tense() {
        assert_eq!(past_tense("add"), "Added");
        assert_eq!(past_tense("delete"), "Deleted");
    }
}
