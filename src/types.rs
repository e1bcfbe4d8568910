// src/types.rs

//! Small value types shared by the config layer, the registry and the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a task's command is executed.
///
/// - `Shell`: `command` and `args` are joined and handed to the platform shell.
/// - everything else: `command` is spawned directly with `args`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Shell,
    Process,
    Npm,
    Cargo,
    Go,
    Make,
}

impl TaskKind {
    pub fn uses_shell(self) -> bool {
        matches!(self, TaskKind::Shell)
    }
}

/// Task group used for "run build task" / "run test task" style lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskGroup {
    Build,
    Test,
    Run,
    Clean,
    Deploy,
    #[default]
    None,
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskGroup::Build => "build",
            TaskGroup::Test => "test",
            TaskGroup::Run => "run",
            TaskGroup::Clean => "clean",
            TaskGroup::Deploy => "deploy",
            TaskGroup::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(TaskGroup::Build),
            "test" => Ok(TaskGroup::Test),
            "run" => Ok(TaskGroup::Run),
            "clean" => Ok(TaskGroup::Clean),
            "deploy" => Ok(TaskGroup::Deploy),
            "none" => Ok(TaskGroup::None),
            other => Err(format!(
                "invalid task group: {other} (expected build, test, run, clean, deploy or none)"
            )),
        }
    }
}

/// Where a task definition came from.
///
/// Precedence when labels collide: `User` > `AutoDetected` > `Temporary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSource {
    #[default]
    User,
    AutoDetected,
    Temporary,
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSource::User => f.write_str("user"),
            TaskSource::AutoDetected => f.write_str("auto-detected"),
            TaskSource::Temporary => f.write_str("temporary"),
        }
    }
}

/// `runOptions.runOn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOn {
    #[default]
    Manual,
    FolderOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reveal {
    #[default]
    Always,
    Silent,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    #[default]
    Shared,
    Dedicated,
    New,
}

/// Presentation options. The engine never interprets these; they are handed
/// to the output sink as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Presentation {
    pub reveal: Reveal,
    pub panel: PanelKind,
    pub focus: bool,
    pub clear: bool,
}
