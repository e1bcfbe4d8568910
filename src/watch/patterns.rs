// src/watch/patterns.rs

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobMatcher};

use crate::config::model::RunOnSaveConfig;
use crate::errors::{Result, TaskdeckError};

/// A run-on-save rule with its glob compiled.
#[derive(Clone)]
pub struct SaveRule {
    config: RunOnSaveConfig,
    matcher: GlobMatcher,
}

impl fmt::Debug for SaveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveRule")
            .field("id", &self.config.id)
            .field("glob", &self.config.glob_pattern)
            .finish_non_exhaustive()
    }
}

impl SaveRule {
    pub fn compile(config: RunOnSaveConfig) -> Result<Self> {
        let matcher = Glob::new(&config.glob_pattern)
            .map_err(|source| TaskdeckError::InvalidGlob {
                pattern: config.glob_pattern.clone(),
                source,
            })?
            .compile_matcher();
        Ok(Self { config, matcher })
    }

    pub fn config(&self) -> &RunOnSaveConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Whether a saved `path` matches, tried relative to `root` first and
    /// then as given.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        if let Some(rel) = relative_str(root, path) {
            if self.matcher.is_match(&rel) {
                return true;
            }
        }
        self.matcher.is_match(path.to_string_lossy().replace('\\', "/"))
    }
}

/// `path` relative to `root` with forward slashes, if it lies below it.
///
/// A plain prefix strip is tried first; canonicalizing both sides covers
/// symlinked roots (e.g. `/var` vs `/private/var` on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let to_string = |p: &Path| p.to_string_lossy().replace('\\', "/");

    if path.is_relative() {
        return Some(to_string(path));
    }
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_string(rel));
    }
    let (root, path) = (root.canonicalize().ok()?, path.canonicalize().ok()?);
    path.strip_prefix(&root).ok().map(to_string)
}
