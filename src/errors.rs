// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::engine::RunId;

#[derive(Error, Debug)]
pub enum TaskdeckError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("A user task labelled '{0}' already exists")]
    DuplicateLabel(String),

    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Invalid pattern in problem matcher '{matcher}': {pattern}: {source}")]
    InvalidMatcherPattern {
        matcher: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskdeckError>;
