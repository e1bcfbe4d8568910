// src/history.rs

//! Finished-run history and per-label invocation recency.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{RunId, TaskRun};

pub const DEFAULT_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recency {
    pub last_run: DateTime<Utc>,
    pub run_count: u64,
}

/// Bounded history of terminal runs, newest first.
///
/// Recency is tracked separately and counts process starts, so a run that
/// is still going already counts.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    limit: usize,
    runs: VecDeque<TaskRun>,
    recency: HashMap<String, Recency>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryStore {
    /// `limit` is at least 1.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            runs: VecDeque::with_capacity(limit.min(DEFAULT_HISTORY_LIMIT)),
            recency: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn record(&mut self, run: TaskRun) {
        self.runs.push_front(run);
        self.runs.truncate(self.limit);
    }

    pub fn history(&self) -> Vec<TaskRun> {
        self.runs.iter().cloned().collect()
    }

    pub fn find(&self, id: RunId) -> Option<&TaskRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn mark_started(&mut self, label: &str, at: DateTime<Utc>) {
        self.recency
            .entry(label.to_string())
            .and_modify(|r| {
                r.last_run = at;
                r.run_count += 1;
            })
            .or_insert(Recency {
                last_run: at,
                run_count: 1,
            });
    }

    pub fn recent(&self, label: &str) -> Option<Recency> {
        self.recency.get(label).copied()
    }

    /// Labels by most recent start, at most `limit` of them.
    pub fn recent_tasks(&self, limit: usize) -> Vec<String> {
        let mut entries: Vec<(&String, &Recency)> = self.recency.iter().collect();
        entries.sort_by(|a, b| b.1.last_run.cmp(&a.1.last_run).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(limit)
            .map(|(label, _)| label.clone())
            .collect()
    }
}
