// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::TaskGroup;

/// Command-line arguments for `taskdeck`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdeck",
    version,
    about = "Run project tasks, keep watch-mode tasks alive and turn tool output into diagnostics.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task document (TOML).
    ///
    /// Default: `TASKDECK_CONFIG`, else `Tasks.toml` in the current working
    /// directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDECK_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Skip auto-detection of tasks from Cargo.toml, package.json, Makefile
    /// and go.mod.
    #[arg(long, global = true)]
    pub no_detect: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every visible task.
    List {
        /// Only tasks of this group.
        #[arg(long)]
        group: Option<TaskGroup>,
    },

    /// Run a task and its dependencies, then print its diagnostics.
    Run {
        /// Task label. Without it the default task of `--group` is used.
        label: Option<String>,

        #[arg(long, required_unless_present = "label")]
        group: Option<TaskGroup>,

        /// Present the run as a terminal run.
        #[arg(long)]
        terminal: bool,
    },

    /// Start folder-open tasks and run tasks on save until Ctrl-C.
    Watch,

    /// Parse a file (or stdin) with problem matchers.
    Parse {
        /// Matcher name, e.g. `$tsc`. Repeatable.
        #[arg(long = "matcher", short = 'm', required = true, value_name = "NAME")]
        matchers: Vec<String>,

        /// Base directory for relative file paths.
        #[arg(long, value_name = "DIR")]
        base: Option<PathBuf>,

        /// Print diagnostics as JSON.
        #[arg(long)]
        json: bool,

        /// Input file; stdin when omitted.
        file: Option<PathBuf>,
    },

    /// List the available problem matchers.
    Matchers,

    /// Validate the task document without running anything.
    Check,
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
