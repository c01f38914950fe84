// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `forkdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "forkdag",
    version,
    about = "Parallel build executor: fork workers over a dependency DAG.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Forkdag.toml")]
    pub config: String,

    /// Target unit(s) to bring up to date. May be given multiple times.
    ///
    /// Default: every unit nothing else depends on.
    #[arg(long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Run every action synchronously in the coordinator, no forking.
    #[arg(long)]
    pub serial: bool,

    /// Override [build].max_forks.
    #[arg(long, value_name = "N")]
    pub max_forks: Option<usize>,

    /// Record breadcrumbs to PATH (overrides [build].breadcrumbs_to).
    #[arg(long, value_name = "PATH")]
    pub breadcrumbs_to: Option<String>,

    /// Replay the action sequence from PATH instead of planning
    /// (overrides [build].using_breadcrumbs_from).
    #[arg(long, value_name = "PATH")]
    pub replay: Option<String>,

    /// Build the plan and print it, but execute nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FORKDAG_LOG` or a default level is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
