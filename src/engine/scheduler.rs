// src/engine/scheduler.rs

//! The run scheduler: the async shell around registry lookups, dependency
//! resolution and process driving.
//!
//! Every public entry point validates synchronously (unknown task,
//! dependency cycle, unknown dependency) and then hands the invocation to
//! a tokio task, returning a [`RunHandle`] in `pending`. Each step of a
//! dependency chain is a run of its own and is registered as the active run
//! of its label, so concurrent invocations share it instead of starting
//! the same task twice.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::model::TaskConfig;
use crate::dag::resolve_execution_order;
use crate::engine::background::BackgroundTracker;
use crate::engine::run::{RunHandle, Step};
use crate::engine::{BackgroundStatus, OutputLine, RunId, RunStatus, TaskRun};
use crate::errors::{Result, TaskdeckError};
use crate::exec::{OutputSink, OutputTarget, ProcessBackend, ProcessEvent, ProcessHandle, SpawnRequest};
use crate::history::HistoryStore;
use crate::matcher::{MatcherCatalog, ParsedDiagnostic, StreamParser};
use crate::registry::TaskRegistry;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler handle. Cloning is cheap; all clones drive the same runs.
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<RwLock<TaskRegistry>>,
    history: Arc<Mutex<HistoryStore>>,
    catalog: Arc<MatcherCatalog>,
    backend: Arc<dyn ProcessBackend>,
    sink: Arc<dyn OutputSink>,
    /// Non-terminal runs by label.
    active: Mutex<HashMap<String, RunHandle>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("active", &lock(&self.shared.active).len())
            .finish_non_exhaustive()
    }
}

/// How a dependency step ended, from the point of view of its dependent.
enum StepOutcome {
    Done,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<RwLock<TaskRegistry>>,
        history: Arc<Mutex<HistoryStore>>,
        catalog: Arc<MatcherCatalog>,
        backend: Arc<dyn ProcessBackend>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                history,
                catalog,
                backend,
                sink,
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<RwLock<TaskRegistry>> {
        &self.shared.registry
    }

    pub fn history(&self) -> &Arc<Mutex<HistoryStore>> {
        &self.shared.history
    }

    pub fn catalog(&self) -> &Arc<MatcherCatalog> {
        &self.shared.catalog
    }

    /// Run the task registered under `label`, output to the panel.
    pub fn run(&self, label: &str) -> Result<RunHandle> {
        let task = self.shared.lookup_required(label)?;
        self.launch(task, OutputTarget::Panel)
    }

    /// Same as [`TaskScheduler::run`], presented in a terminal.
    pub fn run_in_terminal(&self, label: &str) -> Result<RunHandle> {
        let task = self.shared.lookup_required(label)?;
        self.launch(task, OutputTarget::Terminal)
    }

    /// Run `label` as a background task, whatever its `isBackground` says.
    pub fn run_background(&self, label: &str) -> Result<RunHandle> {
        let mut task = self.shared.lookup_required(label)?;
        task.is_background = true;
        self.launch(task, OutputTarget::Panel)
    }

    /// Run a definition that need not be in the registry. Dependencies are
    /// still looked up there.
    pub fn run_config(&self, task: TaskConfig) -> Result<RunHandle> {
        self.launch(task, OutputTarget::Panel)
    }

    /// Start a new run from the configuration snapshot of `previous`.
    pub fn rerun(&self, previous: &TaskRun) -> Result<RunHandle> {
        info!(task = %previous.label(), previous = %previous.id, "rerunning task");
        self.run_config(previous.config.clone())
    }

    /// Start every `runOn = "folderOpen"` task. Tasks that fail validation
    /// are logged and skipped.
    pub fn run_folder_open_tasks(&self) -> Vec<RunHandle> {
        let tasks = self.shared.read_registry().folder_open_tasks();
        tasks
            .into_iter()
            .filter_map(|task| {
                let label = task.label.clone();
                match self.launch(task, OutputTarget::Panel) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        warn!(task = %label, error = %err, "could not start folder-open task");
                        None
                    }
                }
            })
            .collect()
    }

    /// Cancel a run. The run is marked `cancelled` before the process is
    /// asked to stop. An in-flight dependency step is cancelled too when this
    /// run started it; a step that was already running on its own is left
    /// alone.
    ///
    /// Cancelling a run that already finished is a no-op.
    pub fn cancel(&self, id: RunId) -> Result<()> {
        let Some(handle) = self.shared.find_active(id) else {
            if lock(&self.shared.history).find(id).is_some() {
                debug!(run_id = %id, "cancel requested for finished run");
                return Ok(());
            }
            return Err(TaskdeckError::RunNotFound(id));
        };

        if let Some(run) = handle.finish(RunStatus::Cancelled, None, None) {
            info!(task = %run.label(), run_id = %id, "run cancelled");
            self.shared.finished(run);
        }
        if let Some(terminator) = handle.take_terminator() {
            terminator.terminate();
        }
        if let Some(step) = handle.take_step() {
            if step.owned {
                if let Err(err) = self.cancel(step.handle.id()) {
                    debug!(run_id = %id, error = %err, "dependency step already gone");
                }
            } else {
                debug!(run_id = %id, step = %step.handle.id(), "leaving shared dependency running");
            }
        }
        Ok(())
    }

    /// Cancel every active run. Returns how many were cancelled.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<RunId> = lock(&self.shared.active).values().map(RunHandle::id).collect();
        ids.into_iter().filter(|id| self.cancel(*id).is_ok()).count()
    }

    /// Snapshots of every non-terminal run, oldest first.
    pub fn active_runs(&self) -> Vec<TaskRun> {
        let mut runs: Vec<TaskRun> = lock(&self.shared.active)
            .values()
            .map(RunHandle::snapshot)
            .collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    /// Diagnostics recomputed from a run's output with its matchers. File
    /// paths are resolved against the task's `cwd`.
    pub fn diagnostics(&self, id: RunId) -> Result<Vec<ParsedDiagnostic>> {
        let run = match self.shared.find_active(id) {
            Some(handle) => handle.snapshot(),
            None => lock(&self.shared.history)
                .find(id)
                .cloned()
                .ok_or(TaskdeckError::RunNotFound(id))?,
        };
        Ok(self.shared.catalog.parse(
            run.output_text(),
            &run.config.problem_matchers,
            &base_path(&run.config),
        ))
    }

    fn launch(&self, task: TaskConfig, target: OutputTarget) -> Result<RunHandle> {
        let order = {
            let registry = self.shared.read_registry();
            resolve_execution_order(&task, |label| registry.get(label).cloned())?
        };

        let top = {
            let mut active = lock(&self.shared.active);
            if let Some(existing) = active.get(&task.label) {
                if !existing.is_terminal() {
                    debug!(task = %task.label, run_id = %existing.id(), "task already running; reusing run");
                    return Ok(existing.clone());
                }
            }
            let handle = RunHandle::new(self.shared.allocate_id(), task.clone());
            active.insert(task.label.clone(), handle.clone());
            handle
        };

        let steps: Vec<TaskConfig> = order
            .into_iter()
            .filter(|t| t.label != task.label)
            .collect();

        info!(
            task = %task.label,
            run_id = %top.id(),
            deps = ?steps.iter().map(|t| t.label.as_str()).collect::<Vec<_>>(),
            "run scheduled"
        );

        let shared = Arc::clone(&self.shared);
        let handle = top.clone();
        tokio::spawn(async move {
            Shared::drive_chain(shared, handle, steps, target).await;
        });
        Ok(top)
    }
}

impl Shared {
    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, TaskRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup_required(&self, label: &str) -> Result<TaskConfig> {
        self.read_registry()
            .get(label)
            .cloned()
            .ok_or_else(|| TaskdeckError::TaskNotFound(label.to_string()))
    }

    fn allocate_id(&self) -> RunId {
        RunId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn find_active(&self, id: RunId) -> Option<RunHandle> {
        lock(&self.active).values().find(|h| h.id() == id).cloned()
    }

    /// Existing active run for the step's label, or a freshly started one.
    fn acquire_step(self: &Arc<Self>, task: &TaskConfig, target: OutputTarget) -> Step {
        let mut active = lock(&self.active);
        if let Some(existing) = active.get(&task.label) {
            if !existing.is_terminal() {
                debug!(task = %task.label, run_id = %existing.id(), "dependency already running; waiting for it");
                return Step {
                    handle: existing.clone(),
                    owned: false,
                };
            }
        }
        let handle = RunHandle::new(self.allocate_id(), task.clone());
        active.insert(task.label.clone(), handle.clone());
        drop(active);

        let shared = Arc::clone(self);
        let step = handle.clone();
        tokio::spawn(async move { shared.drive_process(step, target).await });
        Step {
            handle,
            owned: true,
        }
    }

    /// Bookkeeping for a run that just became terminal.
    fn finished(&self, run: TaskRun) {
        {
            let mut active = lock(&self.active);
            if active.get(run.label()).is_some_and(|h| h.id() == run.id) {
                active.remove(run.label());
            }
        }
        self.sink.closed(&run);
        info!(
            task = %run.label(),
            run_id = %run.id,
            status = %run.status,
            exit_code = ?run.exit_code,
            "run finished"
        );
        lock(&self.history).record(run);
    }

    async fn drive_chain(
        self: Arc<Self>,
        top: RunHandle,
        steps: Vec<TaskConfig>,
        target: OutputTarget,
    ) {
        for dep in steps {
            if top.is_terminal() {
                return;
            }
            let step = self.acquire_step(&dep, target);
            top.set_step(Some(step.clone()));
            // Cancelled between acquiring the step and registering it.
            if top.is_terminal() {
                if let Some(step) = top.take_step().filter(|s| s.owned) {
                    step_cancelled_with(&self, &step.handle);
                }
                return;
            }

            let outcome = tokio::select! {
                outcome = self.wait_step(&dep, &step.handle) => outcome,
                _ = top.wait() => {
                    debug!(task = %top.label(), run_id = %top.id(), "run ended while waiting for a dependency");
                    return;
                }
            };
            top.set_step(None);

            if let StepOutcome::Failed { exit_code, reason } = outcome {
                let reason = format!("dependency '{}' failed: {reason}", dep.label);
                warn!(task = %top.label(), run_id = %top.id(), %reason, "aborting run");
                if let Some(run) = top.finish(RunStatus::Failed, exit_code, Some(reason)) {
                    self.finished(run);
                }
                return;
            }
        }

        if !top.is_terminal() {
            self.drive_process(top, target).await;
        }
    }

    async fn wait_step(&self, dep: &TaskConfig, step: &RunHandle) -> StepOutcome {
        if !dep.is_background {
            let run = step.wait().await;
            return match run.status {
                RunStatus::Completed => StepOutcome::Done,
                status => StepOutcome::Failed {
                    exit_code: run.exit_code,
                    reason: run.failure_reason.unwrap_or_else(|| status_reason(status, run.exit_code)),
                },
            };
        }

        let tracks_compiles = self
            .catalog
            .resolve(&dep.problem_matchers)
            .iter()
            .any(|m| m.has_background());

        let run = step
            .wait_until(|r| {
                r.status.is_terminal()
                    || (r.status == RunStatus::Running
                        && (!tracks_compiles
                            || (r.last_compile_end.is_some()
                                && r.background_status != Some(BackgroundStatus::Compiling))))
            })
            .await;

        if run.status.is_terminal() {
            return StepOutcome::Failed {
                exit_code: run.exit_code,
                reason: run
                    .failure_reason
                    .unwrap_or_else(|| status_reason(run.status, run.exit_code)),
            };
        }
        if run.background_status == Some(BackgroundStatus::Error) {
            return StepOutcome::Failed {
                exit_code: None,
                reason: "background task reported errors".to_string(),
            };
        }
        StepOutcome::Done
    }

    async fn drive_process(self: Arc<Self>, run: RunHandle, target: OutputTarget) {
        let task = run.config();
        let request = SpawnRequest::from_task(&task);
        debug!(task = %task.label, run_id = %run.id(), cmd = %request.command_line(), "spawning");

        let ProcessHandle {
            mut events,
            terminator,
        } = match self.backend.spawn(request).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(task = %task.label, run_id = %run.id(), error = %err, "failed to start process");
                if let Some(done) = run.finish(RunStatus::Failed, None, Some(format!("failed to start: {err}"))) {
                    self.finished(done);
                }
                return;
            }
        };

        // Install first, then check: a cancel that lands in between either
        // takes the terminator itself or is seen here.
        run.set_terminator(terminator);
        if run.is_terminal() {
            if let Some(terminator) = run.take_terminator() {
                terminator.terminate();
            }
            return;
        }

        let started = Utc::now();
        run.mark_running(started);
        lock(&self.history).mark_started(&task.label, started);

        let mut tracker = task.is_background.then(BackgroundTracker::new);
        if let Some(tracker) = tracker.as_mut() {
            run.set_background(tracker.started(), None);
        }
        let mut parser = tracker.as_ref().map(|_| {
            StreamParser::new(self.catalog.resolve(&task.problem_matchers), base_path(&task))
        });

        self.sink.opened(&run.snapshot(), target);
        info!(task = %task.label, run_id = %run.id(), background = task.is_background, "run started");

        let mut exit_code = None;
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Line { stream, text } => {
                    let report = parser.as_mut().map(|p| p.feed(&text));
                    let line = OutputLine { stream, text };
                    if !run.push_line(line.clone()) {
                        // Cancelled: the scheduler has already recorded it.
                        return;
                    }
                    self.sink.line(run.id(), &task.label, &line);
                    if let (Some(tracker), Some(report)) = (tracker.as_mut(), report) {
                        if let Some(status) =
                            tracker.observe(report.signal.as_ref(), &report.diagnostics, Utc::now())
                        {
                            debug!(task = %task.label, run_id = %run.id(), %status, "background status");
                            run.set_background(status, tracker.last_compile_end());
                        }
                    }
                }
                ProcessEvent::Exited { code } => {
                    exit_code = code;
                    break;
                }
            }
        }
        run.take_terminator();

        let (status, reason) = if let Some(tracker) = tracker.as_mut() {
            run.set_background(tracker.exited(), None);
            (
                RunStatus::Failed,
                Some("background task exited unexpectedly".to_string()),
            )
        } else if exit_code == Some(0) {
            (RunStatus::Completed, None)
        } else if exit_code.is_none() {
            (
                RunStatus::Failed,
                Some("process ended without an exit code".to_string()),
            )
        } else {
            (RunStatus::Failed, None)
        };

        if let Some(done) = run.finish(status, exit_code, reason) {
            self.finished(done);
        }
    }
}

/// Cancel a step whose dependent was cancelled before it could record it.
fn step_cancelled_with(shared: &Shared, step: &RunHandle) {
    if let Some(run) = step.finish(RunStatus::Cancelled, None, None) {
        shared.finished(run);
    }
    if let Some(terminator) = step.take_terminator() {
        terminator.terminate();
    }
}

fn status_reason(status: RunStatus, exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("{status} with exit code {code}"),
        None => status.to_string(),
    }
}

fn base_path(task: &TaskConfig) -> PathBuf {
    task.cwd.clone().unwrap_or_default()
}
