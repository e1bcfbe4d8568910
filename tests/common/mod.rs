#![allow(dead_code)]

use std::sync::{Arc, Mutex, RwLock};

use taskdeck::config::TaskConfig;
use taskdeck::engine::TaskScheduler;
use taskdeck::exec::{OutputSink, TracingSink};
use taskdeck::history::HistoryStore;
use taskdeck::matcher::MatcherCatalog;
use taskdeck::registry::TaskRegistry;
use taskdeck_test_utils::{FakeBackend, init_tracing};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const TSC_WATCH_BEGIN: &str =
    "[10:00:00 AM] File change detected. Starting incremental compilation...";
pub const TSC_WATCH_CLEAN: &str =
    "[10:00:01 AM] Found 0 errors. Watching for file changes.";
pub const TSC_WATCH_FAILED: &str =
    "[10:00:01 AM] Found 1 error. Watching for file changes.";
pub const TSC_ERROR: &str = "src/app.ts(10,5): error TS2322: Type 'string' is not assignable.";

/// Scheduler wired to a fresh registry, history and fake backend.
pub struct Harness {
    pub scheduler: TaskScheduler,
    pub backend: Arc<FakeBackend>,
    pub registry: Arc<RwLock<TaskRegistry>>,
    pub history: Arc<Mutex<HistoryStore>>,
}

pub fn harness(tasks: Vec<TaskConfig>) -> Harness {
    harness_with_sink(tasks, Arc::new(TracingSink))
}

pub fn harness_with_sink(tasks: Vec<TaskConfig>, sink: Arc<dyn OutputSink>) -> Harness {
    build(tasks, MatcherCatalog::builtin(), sink)
}

pub fn harness_with_catalog(tasks: Vec<TaskConfig>, catalog: MatcherCatalog) -> Harness {
    build(tasks, catalog, Arc::new(TracingSink))
}

fn build(tasks: Vec<TaskConfig>, catalog: MatcherCatalog, sink: Arc<dyn OutputSink>) -> Harness {
    init_tracing();

    let mut registry = TaskRegistry::new();
    for task in tasks {
        registry.add_task(task).expect("unique task labels");
    }
    let registry = Arc::new(RwLock::new(registry));
    let history = Arc::new(Mutex::new(HistoryStore::default()));
    let backend = FakeBackend::new();

    let scheduler = TaskScheduler::new(
        Arc::clone(&registry),
        Arc::clone(&history),
        Arc::new(catalog),
        backend.clone(),
        sink,
    );

    Harness {
        scheduler,
        backend,
        registry,
        history,
    }
}

impl Harness {
    pub fn history_labels(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .history()
            .into_iter()
            .map(|r| r.config.label)
            .collect()
    }
}
