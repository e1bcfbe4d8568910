// src/logging.rs

//! Logging setup for `taskdeck` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TASKDECK_LOG` environment variable, in `EnvFilter` syntax
//!    (e.g. "info", "taskdeck::engine=debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for task output and
//! diagnostics.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKDECK_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(lvl.as_str()),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}
