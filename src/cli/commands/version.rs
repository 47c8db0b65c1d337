//! Version command implementation.

use crate::config::DEFAULT_SERVER_URL;
use crate::error::Result;
use serde::Serialize;

use super::print_json;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    default_server: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        return print_json(&VersionOutput {
            version,
            build,
            default_server: DEFAULT_SERVER_URL,
        });
    }

    println!("qs version {version} ({build})");
    Ok(())
}
