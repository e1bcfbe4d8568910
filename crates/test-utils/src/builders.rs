#![allow(dead_code)]

use taskdeck::config::{RunOnSaveConfig, Settings, TaskConfig, TasksDocument};
use taskdeck::matcher::MatcherRef;
use taskdeck::types::{RunOn, TaskGroup, TaskKind, TaskSource};

/// Builder for `TaskConfig`. The command defaults to the label so that
/// `FakeBackend` scripts can be keyed by label.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            task: TaskConfig::new(label, label),
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.task.command = command.to_string();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.task.args.push(arg.to_string());
        self
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn group(mut self, group: TaskGroup, is_default: bool) -> Self {
        self.task.group = group;
        self.task.is_default = is_default;
        self
    }

    pub fn background(mut self) -> Self {
        self.task.is_background = true;
        self
    }

    pub fn matcher(mut self, name: &str) -> Self {
        self.task.problem_matchers.push(MatcherRef::named(name));
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.task.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn run_on_folder_open(mut self) -> Self {
        self.task.run_on = RunOn::FolderOpen;
        self
    }

    pub fn source(mut self, source: TaskSource) -> Self {
        self.task.source = source;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `TasksDocument` to simplify test setup.
#[derive(Default)]
pub struct DocumentBuilder {
    doc: TasksDocument,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.doc.tasks.push(task);
        self
    }

    pub fn with_rule(mut self, id: &str, task: &str, glob: &str, delay_ms: i64) -> Self {
        self.doc
            .run_on_save
            .push(RunOnSaveConfig::new(id, task, glob, delay_ms));
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.doc.settings = Settings {
            history_limit: limit,
        };
        self
    }

    pub fn build(self) -> TasksDocument {
        self.doc
    }
}
