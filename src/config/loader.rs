// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawTasksDocument, TasksDocument};
use crate::errors::Result;

/// Environment variable overriding the default document path.
pub const CONFIG_ENV_VAR: &str = "TASKDECK_CONFIG";

/// Load a task document from a given path and return the raw
/// `RawTasksDocument`.
///
/// This only performs TOML deserialization; it does **not** normalise or
/// validate anything. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawTasksDocument> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_raw(&contents)
}

/// Load a task document from path, normalise it and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for duplicate labels, empty commands and settings sanity.
/// - Warns about dependency cycles and broken inline matchers.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<TasksDocument> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let doc = TasksDocument::try_from(raw)?;
    debug!(
        path = %path.display(),
        tasks = doc.tasks.len(),
        matchers = doc.matchers.len(),
        rules = doc.run_on_save.len(),
        "loaded task document"
    );
    Ok(doc)
}

/// Same as [`load_and_validate`] for an in-memory document.
pub fn parse_str(contents: &str) -> Result<TasksDocument> {
    TasksDocument::try_from(parse_raw(contents)?)
}

fn parse_raw(contents: &str) -> Result<RawTasksDocument> {
    let raw: RawTasksDocument = toml::from_str(contents)?;
    Ok(raw)
}

/// Serialise `doc` in canonical form. Only user tasks are written.
pub fn to_toml_string(doc: &TasksDocument) -> Result<String> {
    let raw = RawTasksDocument::from(doc);
    Ok(toml::to_string_pretty(&raw)?)
}

/// Write `doc` to `path`, creating parent directories as needed.
pub fn save_to_path(doc: &TasksDocument, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let contents = to_toml_string(doc)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    debug!(path = %path.display(), "saved task document");
    Ok(())
}

/// Resolve the default document path: `TASKDECK_CONFIG` if set and
/// non-empty, else `Tasks.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => PathBuf::from("Tasks.toml"),
    }
}
