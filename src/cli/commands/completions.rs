//! Shell completions command implementation.

use crate::cli::{Cli, Shell};
use crate::error::Result;
use clap::CommandFactory;
use clap_complete::{Generator, generate, shells};
use std::io;

const BIN_NAME: &str = "qs";

/// Write completions for `shell` to stdout.
///
/// # Errors
///
/// Infallible today; returns `Result` for uniform dispatch.
pub fn execute(shell: &Shell) -> Result<()> {
    match shell {
        Shell::Bash => emit(shells::Bash),
        Shell::Zsh => emit(shells::Zsh),
        Shell::Fish => emit(shells::Fish),
        Shell::PowerShell => emit(shells::PowerShell),
        Shell::Elvish => emit(shells::Elvish),
    }
    Ok(())
}

fn emit<G: Generator>(generator: G) {
    let mut cmd = Cli::command();
    generate(generator, &mut cmd, BIN_NAME, &mut io::stdout());
}
