// src/engine/mod.rs

//! Run orchestration.
//!
//! This module ties together:
//! - dependency resolution for one invocation (via [`crate::dag`])
//! - per-label de-duplication of active runs
//! - driving processes through a [`ProcessBackend`](crate::exec::ProcessBackend)
//! - background (watch mode) state tracking
//! - history recording when a run reaches a terminal state
//!
//! The pure background state machine lives in [`background`]; observable
//! run state is in [`run`]; the async shell is [`scheduler`].

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::model::TaskConfig;
use crate::exec::OutputStream;

pub mod background;
pub mod run;
pub mod scheduler;

pub use background::BackgroundTracker;
pub use run::RunHandle;
pub use scheduler::TaskScheduler;

/// Output lines kept per run; older lines are dropped first.
pub const OUTPUT_LINE_LIMIT: usize = 10_000;

/// Identifier of one invocation; increases monotonically per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// State of a background (watch mode) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStatus {
    #[default]
    Idle,
    Watching,
    Compiling,
    Error,
}

impl fmt::Display for BackgroundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackgroundStatus::Idle => "idle",
            BackgroundStatus::Watching => "watching",
            BackgroundStatus::Compiling => "compiling",
            BackgroundStatus::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// One invocation of a task.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub id: RunId,
    /// Definition as it was when the run was scheduled.
    pub config: TaskConfig,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// The newest [`OUTPUT_LINE_LIMIT`] lines.
    pub output: VecDeque<OutputLine>,
    /// Lines dropped from the front of `output`.
    pub dropped_lines: u64,
    /// `Some` only for background runs.
    pub background_status: Option<BackgroundStatus>,
    pub last_compile_end: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl TaskRun {
    pub fn new(id: RunId, config: TaskConfig) -> Self {
        let background_status = config.is_background.then_some(BackgroundStatus::Idle);
        Self {
            id,
            config,
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            exit_code: None,
            output: VecDeque::new(),
            dropped_lines: 0,
            background_status,
            last_compile_end: None,
            failure_reason: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Output text in emission order.
    pub fn output_text(&self) -> impl Iterator<Item = &str> {
        self.output.iter().map(|l| l.text.as_str())
    }

    pub(crate) fn push_output(&mut self, line: OutputLine) {
        if self.output.len() == OUTPUT_LINE_LIMIT {
            self.output.pop_front();
            self.dropped_lines += 1;
        }
        self.output.push_back(line);
    }
}
