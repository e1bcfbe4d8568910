// src/watch/trigger.rs

//! Debounced run-on-save triggering.
//!
//! Each rule owns one timer. A matching save aborts the rule's pending
//! timer and arms a new one, so a burst of saves collapses into a single
//! launch at `last save + delay`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::model::RunOnSaveConfig;
use crate::engine::TaskScheduler;
use crate::errors::Result;
use crate::watch::patterns::SaveRule;

/// What the trigger launches tasks through.
pub trait TaskLauncher: Send + Sync {
    fn launch(&self, label: &str) -> Result<()>;
}

impl TaskLauncher for TaskScheduler {
    fn launch(&self, label: &str) -> Result<()> {
        self.run(label).map(|_| ())
    }
}

pub struct RunOnSaveTrigger {
    root: PathBuf,
    launcher: Arc<dyn TaskLauncher>,
    rules: Mutex<Vec<SaveRule>>,
    /// Pending timer per rule id.
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl std::fmt::Debug for RunOnSaveTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOnSaveTrigger")
            .field("root", &self.root)
            .field("rules", &*lock(&self.rules))
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunOnSaveTrigger {
    pub fn new(root: impl Into<PathBuf>, launcher: Arc<dyn TaskLauncher>) -> Self {
        Self {
            root: root.into(),
            launcher,
            rules: Mutex::new(Vec::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a rule, replacing any rule with the same id. Fails with
    /// `InvalidGlob` without touching the current rules.
    pub fn add_rule(&self, config: RunOnSaveConfig) -> Result<()> {
        let rule = SaveRule::compile(config)?;
        let mut rules = lock(&self.rules);
        match rules.iter_mut().find(|r| r.id() == rule.id()) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    /// Remove a rule and its pending timer.
    pub fn remove_rule(&self, id: &str) -> bool {
        if let Some(timer) = lock(&self.timers).remove(id) {
            timer.abort();
        }
        let mut rules = lock(&self.rules);
        let before = rules.len();
        rules.retain(|r| r.id() != id);
        rules.len() != before
    }

    pub fn rules(&self) -> Vec<RunOnSaveConfig> {
        lock(&self.rules).iter().map(|r| r.config().clone()).collect()
    }

    /// Handle one save. Returns the number of rules (re)armed.
    pub fn on_file_saved(&self, path: &Path) -> usize {
        let matching: Vec<RunOnSaveConfig> = lock(&self.rules)
            .iter()
            .filter(|r| r.config().enabled && r.matches(&self.root, path))
            .map(|r| r.config().clone())
            .collect();

        if matching.is_empty() {
            return 0;
        }

        let mut timers = lock(&self.timers);
        for rule in &matching {
            if let Some(previous) = timers.remove(&rule.id) {
                previous.abort();
            }
            debug!(rule = %rule.id, task = %rule.task_id, path = %path.display(), delay_ms = rule.delay_ms(), "arming run-on-save timer");

            let launcher = Arc::clone(&self.launcher);
            let delay = rule.delay();
            let (id, task) = (rule.id.clone(), rule.task_id.clone());
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                info!(rule = %id, task = %task, "run-on-save firing");
                if let Err(err) = launcher.launch(&task) {
                    warn!(rule = %id, task = %task, error = %err, "run-on-save could not start task");
                }
            });
            timers.insert(rule.id.clone(), timer);
        }
        matching.len()
    }

    /// Abort every pending timer.
    pub fn cancel_pending(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.abort();
        }
    }
}

impl Drop for RunOnSaveTrigger {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
