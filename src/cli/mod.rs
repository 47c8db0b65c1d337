//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Quote Sync CLI - offline-first quote collection with server sync
#[derive(Parser, Debug)]
#[command(name = "qs", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.quotesync/data/quotes.db)
    #[arg(long, global = true, env = "QUOTESYNC_DB")]
    pub db: Option<PathBuf>,

    /// Server collection URL (overrides config and QUOTESYNC_SERVER_URL)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync pass against the server
    Sync {
        /// Restore the local version of every conflicting quote afterwards
        #[arg(long)]
        keep_local: bool,
    },

    /// Sync periodically and replay queued requests until interrupted
    Watch {
        /// Seconds between sync passes (default: autoSyncIntervalSecs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List cached quotes
    List {
        /// Only quotes in this category ("all" for every category)
        #[arg(short, long)]
        category: Option<String>,

        /// Case-insensitive text/author search
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List categories in the cache
    Categories,

    /// Show a quote (the last viewed one if no ID is given)
    Show {
        /// Quote ID
        id: Option<String>,

        /// Category filter the quote was reached through
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show a random quote and remember it
    Random {
        /// Only pick from this category ("all" for every category)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Add a quote
    Add(AddArgs),

    /// Edit a locally created quote
    Edit(EditArgs),

    /// Delete a locally created quote
    Delete {
        /// Quote ID
        id: String,
    },

    /// Check whether the server is reachable
    Health,

    /// Show requests waiting to be replayed
    Queue,

    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Quote text
    pub text: String,

    /// Category
    #[arg(short, long)]
    pub category: String,

    /// Author (default: Unknown)
    #[arg(short, long)]
    pub author: Option<String>,

    /// Mark the quote as not editable
    #[arg(long)]
    pub readonly: bool,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Quote ID
    pub id: String,

    /// New text
    #[arg(long)]
    pub text: Option<String>,

    /// New category
    #[arg(short, long)]
    pub category: Option<String>,

    /// New author
    #[arg(short, long)]
    pub author: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Set a value in the config file (e.g. `maxRetries 5`)
    Set {
        /// Setting name, as in the config file (camelCase)
        key: String,
        /// New value
        value: String,
    },
}
