// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The scheduler talks to a `ProcessBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake backend in tests while
//! keeping the production implementation in [`command`](super::command).
//!
//! A spawned process is represented by a [`ProcessHandle`]: an ordered stream
//! of [`ProcessEvent`]s (every output line, then exactly one `Exited`) and a
//! [`Terminator`] used to stop it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use crate::config::model::TaskConfig;
use crate::errors::Result;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line { stream: OutputStream, text: String },
    /// Last event of a process. `code` is `None` when the process was
    /// killed or the platform reported no exit code.
    Exited { code: Option<i32> },
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Join `command` and `args` and hand them to the platform shell.
    pub shell: bool,
}

impl SpawnRequest {
    pub fn from_task(task: &TaskConfig) -> Self {
        Self {
            command: task.command.clone(),
            args: task.args.clone(),
            cwd: task.cwd.clone(),
            env: task.env.clone(),
            shell: task.kind.uses_shell(),
        }
    }

    /// `command` and `args` joined with spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Best-effort stop signal for one process.
#[derive(Debug)]
pub struct Terminator {
    tx: oneshot::Sender<()>,
}

impl Terminator {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx }
    }

    /// Ask the backend to stop the process. A process that already exited
    /// is left alone.
    pub fn terminate(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Debug)]
pub struct ProcessHandle {
    pub events: mpsc::Receiver<ProcessEvent>,
    pub terminator: Terminator,
}

/// Trait abstracting how task processes are started.
///
/// Production code uses [`RealProcessBackend`](super::RealProcessBackend);
/// tests can provide their own implementation that doesn't spawn real
/// processes.
pub trait ProcessBackend: Send + Sync {
    /// Start a process. Failing to start is an error; everything after that
    /// is reported through the returned handle.
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;

    #[test]
    fn request_follows_task_kind() {
        let mut task = TaskConfig::new("b", "cargo");
        task.args = vec!["build".into()];
        assert!(SpawnRequest::from_task(&task).shell);

        task.kind = TaskKind::Cargo;
        let req = SpawnRequest::from_task(&task);
        assert!(!req.shell);
        assert_eq!(req.command_line(), "cargo build");
    }
}
