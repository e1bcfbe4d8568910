// src/engine/run.rs

//! Shared, observable state of one run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::config::model::TaskConfig;
use crate::engine::{BackgroundStatus, OutputLine, RunId, RunStatus, TaskRun};
use crate::exec::Terminator;

#[derive(Debug)]
struct RunCell {
    run: Mutex<TaskRun>,
    /// Bumped on every state change.
    version: watch::Sender<u64>,
    terminator: Mutex<Option<Terminator>>,
    /// Dependency step currently being awaited by this run.
    step: Mutex<Option<Step>>,
}

/// A dependency step awaited by a chain.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub(crate) handle: RunHandle,
    /// The chain started this run itself, as opposed to joining a run that
    /// was already active.
    pub(crate) owned: bool,
}

/// Cheap, cloneable handle to a run owned by the scheduler.
///
/// Readers take snapshots or wait for a predicate; only the scheduler
/// mutates. Once a run is terminal every further mutation is ignored.
#[derive(Debug, Clone)]
pub struct RunHandle(Arc<RunCell>);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunHandle {
    pub(crate) fn new(id: RunId, config: TaskConfig) -> Self {
        let (version, _) = watch::channel(0);
        Self(Arc::new(RunCell {
            run: Mutex::new(TaskRun::new(id, config)),
            version,
            terminator: Mutex::new(None),
            step: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> RunId {
        lock(&self.0.run).id
    }

    pub fn label(&self) -> String {
        lock(&self.0.run).config.label.clone()
    }

    pub fn config(&self) -> TaskConfig {
        lock(&self.0.run).config.clone()
    }

    pub fn snapshot(&self) -> TaskRun {
        lock(&self.0.run).clone()
    }

    pub fn status(&self) -> RunStatus {
        lock(&self.0.run).status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Wait until `pred` holds and return the snapshot it held on.
    ///
    /// `pred` runs with the run locked; keep it cheap. The run is only
    /// cloned once it holds.
    pub async fn wait_until<F>(&self, mut pred: F) -> TaskRun
    where
        F: FnMut(&TaskRun) -> bool,
    {
        let mut rx = self.0.version.subscribe();
        loop {
            {
                let run = lock(&self.0.run);
                if pred(&run) {
                    return run.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Wait for a terminal status.
    pub async fn wait(&self) -> TaskRun {
        self.wait_until(|r| r.status.is_terminal()).await
    }

    /// Apply `f` unless the run is already terminal. Returns whether it ran.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TaskRun),
    {
        {
            let mut run = lock(&self.0.run);
            if run.status.is_terminal() {
                return false;
            }
            f(&mut run);
        }
        self.0.version.send_modify(|v| *v = v.wrapping_add(1));
        true
    }

    pub(crate) fn mark_running(&self, at: DateTime<Utc>) -> bool {
        self.update(|run| {
            run.status = RunStatus::Running;
            run.started_at = Some(at);
        })
    }

    pub(crate) fn push_line(&self, line: OutputLine) -> bool {
        self.update(|run| run.push_output(line))
    }

    pub(crate) fn set_background(
        &self,
        status: BackgroundStatus,
        last_compile_end: Option<DateTime<Utc>>,
    ) -> bool {
        self.update(|run| {
            run.background_status = Some(status);
            if last_compile_end.is_some() {
                run.last_compile_end = last_compile_end;
            }
        })
    }

    /// Move to a terminal status. Returns the final snapshot on the first
    /// transition only, so exactly one caller records the outcome.
    pub(crate) fn finish(
        &self,
        status: RunStatus,
        exit_code: Option<i32>,
        failure_reason: Option<String>,
    ) -> Option<TaskRun> {
        let mut finished = None;
        self.update(|run| {
            run.status = status;
            run.finished_at = Some(Utc::now());
            run.exit_code = exit_code;
            run.failure_reason = failure_reason;
            if status == RunStatus::Cancelled && run.background_status.is_some() {
                run.background_status = Some(BackgroundStatus::Idle);
            }
            finished = Some(run.clone());
        });
        finished
    }

    pub(crate) fn set_terminator(&self, terminator: Terminator) {
        *lock(&self.0.terminator) = Some(terminator);
    }

    pub(crate) fn take_terminator(&self) -> Option<Terminator> {
        lock(&self.0.terminator).take()
    }

    pub(crate) fn set_step(&self, step: Option<Step>) {
        *lock(&self.0.step) = step;
    }

    pub(crate) fn take_step(&self) -> Option<Step> {
        lock(&self.0.step).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OUTPUT_LINE_LIMIT;
    use crate::exec::OutputStream;

    fn handle() -> RunHandle {
        RunHandle::new(RunId(1), TaskConfig::new("t", "true"))
    }

    #[test]
    fn finish_is_reported_once_and_freezes_the_run() {
        let run = handle();
        assert!(run.mark_running(Utc::now()));
        assert!(run.finish(RunStatus::Cancelled, None, None).is_some());
        assert!(run.finish(RunStatus::Completed, Some(0), None).is_none());
        assert!(!run.push_line(OutputLine {
            stream: OutputStream::Stdout,
            text: "late".into(),
        }));

        let snap = run.snapshot();
        assert_eq!(snap.status, RunStatus::Cancelled);
        assert!(snap.finished_at.is_some());
        assert!(snap.output.is_empty());
    }

    #[test]
    fn output_keeps_only_the_newest_lines() {
        let run = handle();
        run.mark_running(Utc::now());
        for i in 0..OUTPUT_LINE_LIMIT + 3 {
            run.push_line(OutputLine {
                stream: OutputStream::Stdout,
                text: i.to_string(),
            });
        }

        let snap = run.snapshot();
        assert_eq!(snap.output.len(), OUTPUT_LINE_LIMIT);
        assert_eq!(snap.dropped_lines, 3);
        assert_eq!(snap.output_text().next(), Some("3"));
        let last = (OUTPUT_LINE_LIMIT + 2).to_string();
        assert_eq!(snap.output_text().last(), Some(last.as_str()));
    }

    #[tokio::test]
    async fn wait_until_sees_later_changes() {
        let run = handle();
        let waiter = {
            let run = run.clone();
            tokio::spawn(async move { run.wait_until(|r| r.output.len() == 2).await })
        };
        for text in ["a", "b"] {
            tokio::task::yield_now().await;
            run.push_line(OutputLine {
                stream: OutputStream::Stdout,
                text: text.into(),
            });
        }
        let snap = waiter.await.expect("waiter task");
        assert_eq!(snap.output_text().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
