// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobrun",
    version,
    about = "Command execution backend with background job tracking and an \
             out-of-band interaction monitor.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Jobrun.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Jobrun.toml")]
    pub config: String,

    /// Override the workspace directory from the config file.
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't serve.
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
