// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FORKDAG_LOG` environment variable (level or filter directives)
//! 3. default to `info`
//!
//! Diagnostics go to stderr; stdout is reserved for the scheduler's
//! progress lines.

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;
use crate::errors::{ForkdagError, Result};

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = match cli_level {
        Some(level) => level.as_str().to_string(),
        None => std::env::var("FORKDAG_LOG").unwrap_or_else(|_| "info".to_string()),
    };

    let filter = EnvFilter::try_new(&directive)
        .map_err(|err| ForkdagError::Config(format!("invalid log filter '{directive}': {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
