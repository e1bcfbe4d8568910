// src/config/validate.rs

use std::collections::HashSet;

use tracing::warn;

use crate::config::model::{
    RawGroup, RawMatcherEntry, RawProblemMatcher, RawRunOnSave, RawRunOptions,
    RawTaskDefinition, RawTasksDocument, RunOnSaveConfig, TaskConfig, TasksDocument,
};
use crate::dag::DependencyGraph;
use crate::errors::{Result, TaskdeckError};
use crate::matcher::{CompiledMatcher, MatcherRef};
use crate::types::{TaskGroup, TaskSource};

impl TryFrom<RawTasksDocument> for TasksDocument {
    type Error = TaskdeckError;

    fn try_from(raw: RawTasksDocument) -> std::result::Result<Self, Self::Error> {
        validate_settings(&raw)?;
        validate_tasks(&raw)?;
        validate_run_on_save(&raw)?;

        let tasks: Vec<TaskConfig> = raw.tasks.into_iter().map(TaskConfig::from).collect();
        report_cycles(&tasks);
        report_inline_matchers(&tasks);

        let run_on_save = raw
            .run_on_save
            .into_iter()
            .map(RunOnSaveConfig::from)
            .collect::<Vec<_>>();
        report_dangling_rules(&tasks, &run_on_save);

        Ok(TasksDocument {
            settings: raw.settings,
            tasks,
            matchers: raw.matchers,
            run_on_save,
        })
    }
}

fn validate_settings(raw: &RawTasksDocument) -> Result<()> {
    if raw.settings.history_limit == 0 {
        return Err(TaskdeckError::ConfigError(
            "[settings].history_limit must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(raw: &RawTasksDocument) -> Result<()> {
    let mut seen = HashSet::new();
    for task in &raw.tasks {
        if task.label.trim().is_empty() {
            return Err(TaskdeckError::ConfigError(
                "every [[task]] needs a non-empty label".to_string(),
            ));
        }
        if task.command.trim().is_empty() {
            return Err(TaskdeckError::ConfigError(format!(
                "task '{}' has an empty command",
                task.label
            )));
        }
        if !seen.insert(task.label.as_str()) {
            return Err(TaskdeckError::DuplicateLabel(task.label.clone()));
        }
    }
    Ok(())
}

fn validate_run_on_save(raw: &RawTasksDocument) -> Result<()> {
    let mut seen = HashSet::new();
    for rule in &raw.run_on_save {
        if !seen.insert(rule.id.as_str()) {
            return Err(TaskdeckError::ConfigError(format!(
                "duplicate [[runOnSave]] id '{}'",
                rule.id
            )));
        }
    }
    Ok(())
}

/// Cycles are only reported here; running a task inside one fails with
/// `DependencyCycle` at run time.
fn report_cycles(tasks: &[TaskConfig]) {
    for cycle in DependencyGraph::from_tasks(tasks).cycles() {
        warn!(?cycle, "tasks depend on each other; running them will fail");
    }
}

fn report_inline_matchers(tasks: &[TaskConfig]) {
    for task in tasks {
        for r in &task.problem_matchers {
            if let MatcherRef::Inline(def) = r {
                if let Err(err) = CompiledMatcher::compile(def) {
                    warn!(task = %task.label, error = %err, "inline problem matcher will be ignored");
                }
            }
        }
    }
}

fn report_dangling_rules(tasks: &[TaskConfig], rules: &[RunOnSaveConfig]) {
    for rule in rules {
        if !tasks.iter().any(|t| t.label == rule.task_id) {
            warn!(
                rule = %rule.id,
                task = %rule.task_id,
                "run-on-save rule refers to a task that is not defined in this document"
            );
        }
    }
}

impl From<RawTaskDefinition> for TaskConfig {
    fn from(raw: RawTaskDefinition) -> Self {
        let (group, is_default) = match raw.group {
            None => (TaskGroup::None, false),
            Some(RawGroup::Kind(kind)) => (kind, false),
            Some(RawGroup::Detailed { kind, is_default }) => (kind, is_default),
        };

        let problem_matchers = match raw.problem_matcher {
            None => Vec::new(),
            Some(RawProblemMatcher::Name(name)) => vec![MatcherRef::Named(name)],
            Some(RawProblemMatcher::Inline(def)) => vec![MatcherRef::Inline(def)],
            Some(RawProblemMatcher::List(entries)) => entries
                .into_iter()
                .map(|e| match e {
                    RawMatcherEntry::Name(name) => MatcherRef::Named(name),
                    RawMatcherEntry::Inline(def) => MatcherRef::Inline(def),
                })
                .collect(),
        };

        Self {
            label: raw.label,
            kind: raw.kind,
            command: raw.command,
            args: raw.args,
            cwd: raw.cwd,
            env: raw.env,
            group,
            is_default,
            is_background: raw.is_background,
            depends_on: raw.depends_on,
            presentation: raw.presentation,
            problem_matchers,
            run_on: raw.run_options.run_on,
            source: TaskSource::User,
            detail: raw.detail,
        }
    }
}

impl From<&TaskConfig> for RawTaskDefinition {
    fn from(task: &TaskConfig) -> Self {
        let group = match (task.group, task.is_default) {
            (kind, true) => Some(RawGroup::Detailed {
                kind,
                is_default: true,
            }),
            (TaskGroup::None, false) => None,
            (kind, false) => Some(RawGroup::Kind(kind)),
        };

        let problem_matcher = match task.problem_matchers.as_slice() {
            [] => None,
            [MatcherRef::Named(name)] => Some(RawProblemMatcher::Name(name.clone())),
            [MatcherRef::Inline(def)] => Some(RawProblemMatcher::Inline(def.clone())),
            refs => Some(RawProblemMatcher::List(
                refs.iter()
                    .map(|r| match r {
                        MatcherRef::Named(name) => RawMatcherEntry::Name(name.clone()),
                        MatcherRef::Inline(def) => RawMatcherEntry::Inline(def.clone()),
                    })
                    .collect(),
            )),
        };

        Self {
            label: task.label.clone(),
            kind: task.kind,
            command: task.command.clone(),
            args: task.args.clone(),
            cwd: task.cwd.clone(),
            is_background: task.is_background,
            depends_on: task.depends_on.clone(),
            detail: task.detail.clone(),
            group,
            env: task.env.clone(),
            presentation: task.presentation,
            run_options: RawRunOptions { run_on: task.run_on },
            problem_matcher,
        }
    }
}

impl From<RawRunOnSave> for RunOnSaveConfig {
    fn from(raw: RawRunOnSave) -> Self {
        let mut rule = RunOnSaveConfig::new(raw.id, raw.task_id, raw.glob_pattern, raw.delay);
        rule.enabled = raw.enabled;
        rule
    }
}

impl From<&RunOnSaveConfig> for RawRunOnSave {
    fn from(rule: &RunOnSaveConfig) -> Self {
        Self {
            id: rule.id.clone(),
            task_id: rule.task_id.clone(),
            glob_pattern: rule.glob_pattern.clone(),
            delay: i64::try_from(rule.delay_ms()).unwrap_or(i64::MAX),
            enabled: rule.enabled,
        }
    }
}

/// Only user tasks are persisted; detected and temporary tasks are rebuilt
/// at runtime.
impl From<&TasksDocument> for RawTasksDocument {
    fn from(doc: &TasksDocument) -> Self {
        Self {
            settings: doc.settings.clone(),
            tasks: doc
                .tasks
                .iter()
                .filter(|t| t.source == TaskSource::User)
                .map(RawTaskDefinition::from)
                .collect(),
            matchers: doc.matchers.clone(),
            run_on_save: doc.run_on_save.iter().map(RawRunOnSave::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunOn;

    fn parse(src: &str) -> Result<TasksDocument> {
        let raw: RawTasksDocument = toml::from_str(src)?;
        TasksDocument::try_from(raw)
    }

    #[test]
    fn union_shapes_are_normalised() {
        let doc = parse(
            r#"
[[task]]
label = "build"
command = "tsc"
group = { kind = "build", isDefault = true }
problemMatcher = "$tsc"

[[task]]
label = "test"
type = "process"
command = "npm"
args = ["test"]
group = "test"
problemMatcher = ["$eslint-stylish", { name = "inline", patterns = [{ regexp = "^(?P<file>.+):(?P<message>.+)$" }] }]
runOptions = { runOn = "folderOpen" }

[[task]]
label = "lint"
command = "eslint"
problemMatcher = { name = "one", severity = "warning", patterns = [{ regexp = "x" }] }
"#,
        )
        .expect("valid document");

        let build = &doc.tasks[0];
        assert_eq!(build.group, TaskGroup::Build);
        assert!(build.is_default);
        assert_eq!(build.problem_matchers, vec![MatcherRef::named("$tsc")]);

        let test = &doc.tasks[1];
        assert_eq!(test.group, TaskGroup::Test);
        assert!(!test.is_default);
        assert_eq!(test.run_on, RunOn::FolderOpen);
        assert_eq!(test.problem_matchers.len(), 2);
        assert!(matches!(test.problem_matchers[1], MatcherRef::Inline(ref d) if d.name == "inline"));

        let lint = &doc.tasks[2];
        assert_eq!(lint.group, TaskGroup::None);
        assert!(matches!(lint.problem_matchers.as_slice(), [MatcherRef::Inline(d)] if d.severity.as_deref() == Some("warning")));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let result = parse(
            r#"
[[task]]
label = "a"
command = "x"

[[task]]
label = "a"
command = "y"
"#,
        );
        assert!(matches!(result, Err(TaskdeckError::DuplicateLabel(ref l)) if l == "a"));
    }

    #[test]
    fn cycles_load_but_zero_history_does_not() {
        let cyclic = parse(
            r#"
[[task]]
label = "a"
command = "x"
dependsOn = ["a"]
"#,
        );
        assert!(cyclic.is_ok());

        let bad = parse("[settings]\nhistory_limit = 0\n");
        assert!(matches!(bad, Err(TaskdeckError::ConfigError(_))));
    }

    #[test]
    fn run_on_save_defaults_and_clamping() {
        let doc = parse(
            r#"
[[runOnSave]]
id = "fast"
taskId = "build"
globPattern = "**/*.rs"

[[runOnSave]]
id = "slow"
taskId = "build"
globPattern = "**/*.rs"
delay = 99999
enabled = false
"#,
        )
        .expect("valid document");
        assert_eq!(doc.run_on_save[0].delay_ms(), 300);
        assert!(doc.run_on_save[0].enabled);
        assert_eq!(doc.run_on_save[1].delay_ms(), 10_000);
        assert!(!doc.run_on_save[1].enabled);
    }

    #[test]
    fn canonical_task_converts_back_to_the_same_shape() {
        let mut task = TaskConfig::new("watch", "tsc");
        task.args = vec!["-w".into()];
        task.group = TaskGroup::Build;
        task.is_background = true;
        task.problem_matchers = vec![MatcherRef::named("$tsc-watch")];

        let back = TaskConfig::from(RawTaskDefinition::from(&task));
        assert_eq!(back, task);
    }
}
