//! clarity - terminal outliner for projects, work items, comments and worklogs
//!
//! Every command works on one workspace directory, chosen by `--dir`, then
//! `--workspace`, then the configured default.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/clarity/config.toml (or $CLARITY_CONFIG_DIR)
//! - Workspaces: <config dir>/workspaces/<name>/
//! - Logs: $XDG_STATE_HOME/clarity/clarity.log

mod cli;
mod commands;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use clarity_core::Config;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        clarity_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "clarity starting");

    let result = commands::run(cli, &config);
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
