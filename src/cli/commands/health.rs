//! Health command: probe the server once.

use std::time::Instant;

use colored::Colorize;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::remote::RemoteStore;

use super::{load_settings, open_remote, print_json, runtime};

#[derive(Serialize)]
struct HealthOutput<'a> {
    server: &'a str,
    available: bool,
    latency_ms: u64,
}

/// Execute the health command.
///
/// # Errors
///
/// Returns [`Error::Network`] when the server does not answer.
pub fn execute(server: Option<&str>, json: bool) -> Result<()> {
    let config = load_settings(server)?;
    let remote = open_remote(&config)?;

    let started = Instant::now();
    let available = runtime()?.block_on(remote.health_check());
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if json {
        print_json(&HealthOutput {
            server: &config.server_url,
            available,
            latency_ms,
        })?;
    } else if available {
        println!(
            "{} {} ({latency_ms}ms)",
            "✓".green(),
            config.server_url.bold()
        );
    }

    if available {
        Ok(())
    } else {
        Err(Error::Network(format!(
            "{} did not respond",
            config.server_url
        )))
    }
}
