//! Quote Sync CLI entry point.

use clap::Parser;
use qs::cli::commands;
use qs::cli::{Cli, Commands};
use qs::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let server = cli.server.as_deref();
    let json = cli.json;

    match &cli.command {
        Commands::Sync { keep_local } => commands::sync::execute(*keep_local, db, server, json),
        Commands::Watch { interval } => commands::watch::execute(*interval, db, server, json),

        // Local reads
        Commands::List { category, search } => {
            commands::quotes::list(category.as_deref(), search.as_deref(), db, json)
        }
        Commands::Categories => commands::quotes::categories_cmd(db, json),
        Commands::Show { id, category } => {
            commands::quotes::show(id.as_deref(), category.as_deref(), db, json)
        }

        Commands::Random { category } => commands::quotes::random(category.as_deref(), db, json),

        // Mutations
        Commands::Add(args) => commands::quotes::add(args, db, server, json),
        Commands::Edit(args) => commands::quotes::edit(args, db, server, json),
        Commands::Delete { id } => commands::quotes::delete(id, db, server, json),

        Commands::Health => commands::health::execute(server, json),
        Commands::Queue => commands::queue::execute(db, json),
        Commands::Config { command } => commands::config::execute(command, server, json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
