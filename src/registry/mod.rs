// src/registry/mod.rs

//! The task registry: one label-keyed view over user, auto-detected and
//! temporary task definitions.
//!
//! Labels are unique among user tasks only. When sources collide on a label
//! the higher-precedence definition shadows the others
//! (user > auto-detected > temporary).

pub mod detect;

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::model::{TaskConfig, TasksDocument};
use crate::dag::DependencyGraph;
use crate::errors::{Result, TaskdeckError};
use crate::types::{RunOn, TaskGroup, TaskSource};

pub use detect::detect_tasks;

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    user: Vec<TaskConfig>,
    detected: Vec<TaskConfig>,
    temporary: Vec<TaskConfig>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the user tasks of a validated document.
    pub fn from_document(doc: &TasksDocument) -> Result<Self> {
        let mut registry = Self::new();
        for task in &doc.tasks {
            registry.add_task(task.clone())?;
        }
        Ok(registry)
    }

    /// Every visible task: user tasks in insertion order, then auto-detected,
    /// then temporary. Shadowed definitions are left out.
    pub fn all_tasks(&self) -> Vec<TaskConfig> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::with_capacity(self.user.len() + self.detected.len() + self.temporary.len());
        for task in self.user.iter().chain(&self.detected).chain(&self.temporary) {
            if seen.insert(task.label.as_str()) {
                out.push(task.clone());
            }
        }
        out
    }

    /// Highest-precedence definition for `label`.
    pub fn get(&self, label: &str) -> Option<&TaskConfig> {
        self.user
            .iter()
            .chain(&self.detected)
            .chain(&self.temporary)
            .find(|t| t.label == label)
    }

    /// Add a task to the list matching its `source`.
    ///
    /// A user task whose label already belongs to another user task fails
    /// with `DuplicateLabel`. Auto-detected and temporary tasks replace an
    /// earlier definition of the same source and label.
    pub fn add_task(&mut self, task: TaskConfig) -> Result<()> {
        match task.source {
            TaskSource::User => {
                if self.user.iter().any(|t| t.label == task.label) {
                    return Err(TaskdeckError::DuplicateLabel(task.label));
                }
                info!(task = %task.label, "added user task");
                self.user.push(task);
            }
            TaskSource::AutoDetected => upsert(&mut self.detected, task),
            TaskSource::Temporary => upsert(&mut self.temporary, task),
        }
        Ok(())
    }

    /// Replace the user task `old_label` with `task`, keeping its position.
    pub fn update_task(&mut self, old_label: &str, mut task: TaskConfig) -> Result<()> {
        let idx = self
            .user
            .iter()
            .position(|t| t.label == old_label)
            .ok_or_else(|| TaskdeckError::TaskNotFound(old_label.to_string()))?;

        if task.label != old_label && self.user.iter().any(|t| t.label == task.label) {
            return Err(TaskdeckError::DuplicateLabel(task.label));
        }

        task.source = TaskSource::User;
        info!(old = %old_label, task = %task.label, "updated user task");
        self.user[idx] = task;
        Ok(())
    }

    /// Remove the highest-precedence definition of `label` and return it.
    ///
    /// Tasks that still depend on it are left alone; running them fails with
    /// `UnknownDependency` unless another source still provides the label.
    pub fn remove_task(&mut self, label: &str) -> Result<TaskConfig> {
        let removed = [&mut self.user, &mut self.detected, &mut self.temporary]
            .into_iter()
            .find_map(|list| {
                list.iter()
                    .position(|t| t.label == label)
                    .map(|idx| list.remove(idx))
            })
            .ok_or_else(|| TaskdeckError::TaskNotFound(label.to_string()))?;

        let remaining = self.all_tasks();
        let graph = DependencyGraph::from_tasks(remaining.iter().chain(std::iter::once(&removed)));
        let dependents = graph.dependents_of(label);
        if !dependents.is_empty() && self.get(label).is_none() {
            warn!(task = %label, ?dependents, "removed a task that other tasks depend on");
        }
        info!(task = %label, source = %removed.source, "removed task");
        Ok(removed)
    }

    pub fn background_tasks(&self) -> Vec<TaskConfig> {
        self.all_tasks()
            .into_iter()
            .filter(|t| t.is_background)
            .collect()
    }

    /// Replace the whole auto-detected set.
    pub fn set_detected(&mut self, tasks: Vec<TaskConfig>) {
        self.detected = tasks
            .into_iter()
            .map(|mut t| {
                t.source = TaskSource::AutoDetected;
                t
            })
            .collect();
        debug!(count = self.detected.len(), "replaced auto-detected tasks");
    }

    /// The `isDefault` task of `group`, else the first task of that group.
    pub fn default_task(&self, group: TaskGroup) -> Option<TaskConfig> {
        let in_group: Vec<TaskConfig> = self
            .all_tasks()
            .into_iter()
            .filter(|t| t.group == group)
            .collect();
        in_group
            .iter()
            .find(|t| t.is_default)
            .or_else(|| in_group.first())
            .cloned()
    }

    /// Tasks configured with `runOptions.runOn = "folderOpen"`.
    pub fn folder_open_tasks(&self) -> Vec<TaskConfig> {
        self.all_tasks()
            .into_iter()
            .filter(|t| t.run_on == RunOn::FolderOpen)
            .collect()
    }
}

fn upsert(list: &mut Vec<TaskConfig>, task: TaskConfig) {
    match list.iter_mut().find(|t| t.label == task.label) {
        Some(existing) => *existing = task,
        None => list.push(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(label: &str, source: TaskSource) -> TaskConfig {
        let mut t = TaskConfig::new(label, format!("echo {label}"));
        t.source = source;
        t
    }

    #[test]
    fn user_labels_are_unique() {
        let mut reg = TaskRegistry::new();
        reg.add_task(task("build", TaskSource::User)).expect("first add");
        let err = reg.add_task(task("build", TaskSource::User));
        assert!(matches!(err, Err(TaskdeckError::DuplicateLabel(ref l)) if l == "build"));
    }

    #[test]
    fn precedence_and_order() {
        let mut reg = TaskRegistry::new();
        reg.add_task(task("tmp", TaskSource::Temporary)).unwrap();
        reg.set_detected(vec![task("build", TaskSource::User), task("lint", TaskSource::User)]);
        reg.add_task(task("build", TaskSource::User)).unwrap();
        reg.add_task(task("lint", TaskSource::Temporary)).unwrap();

        let all = reg.all_tasks();
        let labels: Vec<_> = all.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["build", "lint", "tmp"]);
        assert_eq!(all[0].source, TaskSource::User);
        assert_eq!(all[1].source, TaskSource::AutoDetected);
        assert_eq!(reg.get("lint").map(|t| t.source), Some(TaskSource::AutoDetected));
    }

    #[test]
    fn update_rejects_collisions_and_unknown_tasks() {
        let mut reg = TaskRegistry::new();
        reg.add_task(task("a", TaskSource::User)).unwrap();
        reg.add_task(task("b", TaskSource::User)).unwrap();

        assert!(matches!(
            reg.update_task("a", task("b", TaskSource::User)),
            Err(TaskdeckError::DuplicateLabel(_))
        ));
        assert!(matches!(
            reg.update_task("zzz", task("c", TaskSource::User)),
            Err(TaskdeckError::TaskNotFound(_))
        ));

        reg.update_task("a", task("a2", TaskSource::User)).unwrap();
        let labels: Vec<_> = reg.all_tasks().into_iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["a2", "b"]);
    }

    #[test]
    fn removing_a_dependency_is_allowed() {
        let mut reg = TaskRegistry::new();
        reg.add_task(task("gen", TaskSource::User)).unwrap();
        let mut build = task("build", TaskSource::User);
        build.depends_on = vec!["gen".into()];
        reg.add_task(build).unwrap();

        let removed = reg.remove_task("gen").expect("removes");
        assert_eq!(removed.label, "gen");
        assert!(reg.get("gen").is_none());
        assert!(reg.get("build").is_some());
        assert!(matches!(reg.remove_task("gen"), Err(TaskdeckError::TaskNotFound(_))));
    }

    #[test]
    fn group_defaults_and_filters() {
        let mut reg = TaskRegistry::new();
        let mut first = task("compile", TaskSource::User);
        first.group = TaskGroup::Build;
        let mut chosen = task("bundle", TaskSource::User);
        chosen.group = TaskGroup::Build;
        chosen.is_default = true;
        let mut watch = task("watch", TaskSource::User);
        watch.is_background = true;
        watch.run_on = RunOn::FolderOpen;
        for t in [first, chosen, watch] {
            reg.add_task(t).unwrap();
        }

        assert_eq!(reg.default_task(TaskGroup::Build).map(|t| t.label), Some("bundle".into()));
        assert!(reg.default_task(TaskGroup::Test).is_none());
        assert_eq!(reg.background_tasks().len(), 1);
        assert_eq!(reg.folder_open_tasks()[0].label, "watch");
    }
}
