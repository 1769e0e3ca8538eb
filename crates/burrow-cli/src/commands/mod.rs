//! CLI command definitions and dispatch.

pub mod run;

use clap::{Parser, Subcommand, ValueEnum};

/// burrow: run a command inside a freshly pulled container image.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Format of diagnostic logs written to stderr (filtered by `RUST_LOG`).
    #[arg(long, global = true, value_enum, env = "BURROW_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image into an ephemeral root and run a command inside it.
    Run(run::RunArgs),
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Dispatches the parsed CLI command to its handler, returning the exit code.
///
/// # Errors
///
/// Returns an error if the command cannot be set up.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Run(args) => run::execute(args),
    }
}
