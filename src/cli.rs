// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `lifecycle`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lifecycle",
    version,
    about = "Reconcile ML job and task lifecycles from scheduler status reports.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Lifecycle.toml` in the current working directory, or
    /// built-in defaults when that file does not exist.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON file with an array of jobs to load into the store before the
    /// warm start.
    #[arg(long, value_name = "PATH")]
    pub seed: Option<PathBuf>,

    /// Newline-delimited JSON ingestion events; `-` reads stdin.
    ///
    /// Without this flag the runtime waits for Ctrl-C.
    #[arg(long, value_name = "PATH")]
    pub events: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LIFECYCLE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
