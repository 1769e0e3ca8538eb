//! # burrow
//!
//! Pulls a public image, extracts it into a throwaway root, and runs one
//! command inside it with its own PID and hostname namespaces. The exit
//! code is the command's own.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::{Cli, LogFormat};

fn main() {
    let cli = Cli::parse();
    let code = match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            burrow_common::constants::LAUNCHER_FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}

fn try_main(cli: Cli) -> anyhow::Result<i32> {
    init_tracing(cli.log_format);
    commands::execute(cli)
}

/// Logs go to stderr so they never interleave with the child's stdout.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
