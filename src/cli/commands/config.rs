//! Config command implementation.

use colored::Colorize;
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config::{SyncConfig, config_path, load_config_from, save_config};
use crate::error::Result;

use super::{load_settings, print_json};

#[derive(Serialize)]
struct SetOutput<'a> {
    key: &'a str,
    value: &'a str,
    path: String,
}

#[derive(Serialize)]
struct PathOutput {
    path: String,
    exists: bool,
}

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the config file is unreadable or invalid.
pub fn execute(command: &ConfigCommands, server: Option<&str>, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(server, json),
        ConfigCommands::Path => path(json),
        ConfigCommands::Set { key, value } => set(key, value, json),
    }
}

fn show(server: Option<&str>, json: bool) -> Result<()> {
    let config = load_settings(server)?;
    if json {
        return print_json(&config);
    }
    print_config(&config);
    Ok(())
}

/// Update one key in the file. Environment overrides are not written back.
fn set(key: &str, value: &str, json: bool) -> Result<()> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    config.set(key, value)?;
    config.validate()?;
    save_config(&config)?;

    if json {
        return print_json(&SetOutput {
            key,
            value: value.trim(),
            path: path.display().to_string(),
        });
    }
    println!("{} {key} = {}", "✓".green(), value.trim());
    Ok(())
}

fn path(json: bool) -> Result<()> {
    let path = config_path()?;
    let exists = path.exists();
    if json {
        return print_json(&PathOutput {
            path: path.display().to_string(),
            exists,
        });
    }
    if exists {
        println!("{}", path.display());
    } else {
        println!("{} {}", path.display(), "(not created)".dimmed());
    }
    Ok(())
}

fn print_config(config: &SyncConfig) {
    println!("{}", "Effective configuration".bold());
    println!("  serverUrl:              {}", config.server_url);
    println!("  requestTimeoutMs:       {}", config.request_timeout_ms);
    println!("  maxRetries:             {}", config.max_retries);
    println!("  baseRetryDelayMs:       {}", config.base_retry_delay_ms);
    println!("  autoSyncIntervalSecs:   {}", config.auto_sync_interval_secs);
    println!("  healthPollIntervalSecs: {}", config.health_poll_interval_secs);
    println!("  queuePersistence:       {}", config.queue_persistence);
    println!("  cacheKey:               {}", config.cache_key);
}
