// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matcher::{MatcherDefinition, MatcherRef};
use crate::types::{Presentation, RunOn, TaskGroup, TaskKind, TaskSource};

/// Upper bound for a run-on-save debounce delay, in milliseconds.
pub const MAX_RUN_ON_SAVE_DELAY_MS: u64 = 10_000;

/// Raw task document as read from `Tasks.toml`.
///
/// ```toml
/// [settings]
/// history_limit = 200
///
/// [[task]]
/// label = "build"
/// type = "shell"
/// command = "tsc"
/// args = ["-p", "."]
/// dependsOn = ["codegen"]
/// group = { kind = "build", isDefault = true }
/// problemMatcher = "$tsc"
///
/// [[matcher]]
/// name = "my-lint"
/// patterns = [{ regexp = '^(?P<file>[^:]+):(?P<line>\d+): (?P<message>.*)$' }]
///
/// [[runOnSave]]
/// id = "ts"
/// taskId = "build"
/// globPattern = "src/**/*.ts"
/// delay = 500
/// ```
///
/// Several fields accept more than one shape here; they are normalised into
/// [`TaskConfig`] by `config::validate`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTasksDocument {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default, rename = "task", skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<RawTaskDefinition>,

    #[serde(default, rename = "matcher", skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherDefinition>,

    #[serde(default, rename = "runOnSave", skip_serializing_if = "Vec::is_empty")]
    pub run_on_save: Vec<RawRunOnSave>,
}

/// `[settings]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Number of finished runs kept by the history store.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

/// `[[task]]` entry.
///
/// Scalar fields come first so the TOML serializer never has to emit a
/// plain value after a table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTaskDefinition {
    pub label: String,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_background: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<RawGroup>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "is_default_presentation")]
    pub presentation: Presentation,

    #[serde(default, skip_serializing_if = "RawRunOptions::is_default")]
    pub run_options: RawRunOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_matcher: Option<RawProblemMatcher>,
}

fn is_default_presentation(p: &Presentation) -> bool {
    *p == Presentation::default()
}

/// `group = "build"` or `group = { kind = "build", isDefault = true }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawGroup {
    Kind(TaskGroup),
    Detailed {
        kind: TaskGroup,
        #[serde(default, rename = "isDefault")]
        is_default: bool,
    },
}

/// `problemMatcher` as a name, a list, or one inline definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawProblemMatcher {
    Name(String),
    List(Vec<RawMatcherEntry>),
    Inline(MatcherDefinition),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawMatcherEntry {
    Name(String),
    Inline(MatcherDefinition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRunOptions {
    #[serde(default)]
    pub run_on: RunOn,
}

impl RawRunOptions {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// `[[runOnSave]]` entry. `delay` is signed so that negative values can be
/// clamped instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRunOnSave {
    pub id: String,
    pub task_id: String,
    pub glob_pattern: String,
    #[serde(default = "default_run_on_save_delay")]
    pub delay: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_run_on_save_delay() -> i64 {
    300
}

fn default_enabled() -> bool {
    true
}

/// Validated task document.
#[derive(Debug, Clone, Default)]
pub struct TasksDocument {
    pub settings: Settings,
    pub tasks: Vec<TaskConfig>,
    pub matchers: Vec<MatcherDefinition>,
    pub run_on_save: Vec<RunOnSaveConfig>,
}

/// Canonical task definition used everywhere past the config boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub label: String,
    pub kind: TaskKind,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub group: TaskGroup,
    pub is_default: bool,
    pub is_background: bool,
    /// Labels of tasks that must run first, in order.
    pub depends_on: Vec<String>,
    pub presentation: Presentation,
    pub problem_matchers: Vec<MatcherRef>,
    pub run_on: RunOn,
    pub source: TaskSource,
    pub detail: Option<String>,
}

impl TaskConfig {
    /// A user shell task with every optional field at its default.
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: TaskKind::Shell,
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            group: TaskGroup::None,
            is_default: false,
            is_background: false,
            depends_on: Vec::new(),
            presentation: Presentation::default(),
            problem_matchers: Vec::new(),
            run_on: RunOn::Manual,
            source: TaskSource::User,
            detail: None,
        }
    }

    /// Command line as shown to humans.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A run-on-save rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOnSaveConfig {
    pub id: String,
    /// Label of the task to run.
    pub task_id: String,
    pub glob_pattern: String,
    pub enabled: bool,
    delay_ms: u64,
}

impl RunOnSaveConfig {
    /// Build a rule; `delay_ms` is clamped to `[0, MAX_RUN_ON_SAVE_DELAY_MS]`.
    pub fn new(
        id: impl Into<String>,
        task_id: impl Into<String>,
        glob_pattern: impl Into<String>,
        delay_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            glob_pattern: glob_pattern.into(),
            enabled: true,
            delay_ms: clamp_delay(delay_ms),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn clamp_delay(delay_ms: i64) -> u64 {
    u64::try_from(delay_ms)
        .unwrap_or(0)
        .min(MAX_RUN_ON_SAVE_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_on_save_delay_is_clamped() {
        assert_eq!(RunOnSaveConfig::new("a", "t", "*", -5).delay_ms(), 0);
        assert_eq!(RunOnSaveConfig::new("a", "t", "*", 500).delay_ms(), 500);
        assert_eq!(
            RunOnSaveConfig::new("a", "t", "*", 60_000).delay_ms(),
            MAX_RUN_ON_SAVE_DELAY_MS
        );
    }

    #[test]
    fn command_line_joins_args() {
        let mut t = TaskConfig::new("b", "cargo");
        t.args = vec!["build".into(), "--release".into()];
        assert_eq!(t.command_line(), "cargo build --release");
    }
}
