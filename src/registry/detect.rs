// src/registry/detect.rs

//! Auto-detection of tasks from well-known project files in a workspace
//! root: `Cargo.toml`, `package.json` scripts, `Makefile` targets and
//! `go.mod`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::model::TaskConfig;
use crate::fs::FileSystem;
use crate::matcher::MatcherRef;
use crate::types::{TaskGroup, TaskKind, TaskSource};

static MAKE_TARGET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][\w.-]*)\s*:([^=]|$)").ok());

/// Detect tasks in `root`. Unreadable or malformed files are skipped.
pub fn detect_tasks(fs: &dyn FileSystem, root: &Path) -> Vec<TaskConfig> {
    let mut tasks = Vec::new();
    tasks.extend(cargo_tasks(fs, root));
    tasks.extend(npm_tasks(fs, root));
    tasks.extend(make_tasks(fs, root));
    tasks.extend(go_tasks(fs, root));
    debug!(root = %root.display(), count = tasks.len(), "detected tasks");
    tasks
}

fn detected(
    label: String,
    kind: TaskKind,
    command: &str,
    args: &[&str],
    root: &Path,
    group: TaskGroup,
) -> TaskConfig {
    let mut task = TaskConfig::new(label, command);
    task.kind = kind;
    task.args = args.iter().map(|a| a.to_string()).collect();
    task.cwd = Some(root.to_path_buf());
    task.group = group;
    task.source = TaskSource::AutoDetected;
    task
}

fn cargo_tasks(fs: &dyn FileSystem, root: &Path) -> Vec<TaskConfig> {
    if !fs.is_file(&root.join("Cargo.toml")) {
        return Vec::new();
    }
    [
        ("build", TaskGroup::Build),
        ("test", TaskGroup::Test),
        ("check", TaskGroup::Build),
        ("clippy", TaskGroup::None),
        ("run", TaskGroup::Run),
    ]
    .into_iter()
    .map(|(sub, group)| {
        let mut task = detected(
            format!("cargo: {sub}"),
            TaskKind::Cargo,
            "cargo",
            &[sub],
            root,
            group,
        );
        task.problem_matchers = vec![MatcherRef::named("$rustc")];
        task
    })
    .collect()
}

fn npm_tasks(fs: &dyn FileSystem, root: &Path) -> Vec<TaskConfig> {
    let path = root.join("package.json");
    if !fs.is_file(&path) {
        return Vec::new();
    }
    let manifest: serde_json::Value = match fs
        .read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(v) => v,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable package.json");
            return Vec::new();
        }
    };

    let Some(scripts) = manifest.get("scripts").and_then(|s| s.as_object()) else {
        return Vec::new();
    };

    scripts
        .keys()
        .map(|name| {
            detected(
                format!("npm: {name}"),
                TaskKind::Npm,
                "npm",
                &["run", name.as_str()],
                root,
                npm_group(name),
            )
        })
        .collect()
}

fn npm_group(script: &str) -> TaskGroup {
    match script {
        "build" | "compile" => TaskGroup::Build,
        "test" => TaskGroup::Test,
        "start" | "dev" | "serve" => TaskGroup::Run,
        "clean" => TaskGroup::Clean,
        "deploy" => TaskGroup::Deploy,
        _ => TaskGroup::None,
    }
}

fn make_tasks(fs: &dyn FileSystem, root: &Path) -> Vec<TaskConfig> {
    let Some(path) = ["Makefile", "makefile", "GNUmakefile"]
        .iter()
        .map(|name| root.join(name))
        .find(|p| fs.is_file(p))
    else {
        return Vec::new();
    };
    let Some(target_re) = MAKE_TARGET.as_ref() else {
        return Vec::new();
    };

    let contents = match fs.read_to_string(&path) {
        Ok(c) => c,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable Makefile");
            return Vec::new();
        }
    };

    let mut targets: Vec<String> = Vec::new();
    for line in contents.lines() {
        if let Some(caps) = target_re.captures(line) {
            let target = &caps[1];
            if !targets.iter().any(|t| t == target) {
                targets.push(target.to_string());
            }
        }
    }

    targets
        .into_iter()
        .map(|target| {
            let group = match target.as_str() {
                "all" | "build" => TaskGroup::Build,
                "test" | "check" => TaskGroup::Test,
                "clean" => TaskGroup::Clean,
                "install" | "deploy" => TaskGroup::Deploy,
                _ => TaskGroup::None,
            };
            let mut task = detected(
                format!("make: {target}"),
                TaskKind::Make,
                "make",
                &[target.as_str()],
                root,
                group,
            );
            task.problem_matchers = vec![MatcherRef::named("$gcc")];
            task
        })
        .collect()
}

fn go_tasks(fs: &dyn FileSystem, root: &Path) -> Vec<TaskConfig> {
    if !fs.is_file(&root.join("go.mod")) {
        return Vec::new();
    }
    let mut build = detected(
        "go: build".into(),
        TaskKind::Go,
        "go",
        &["build", "./..."],
        root,
        TaskGroup::Build,
    );
    build.problem_matchers = vec![MatcherRef::named("$go")];

    let mut test = detected(
        "go: test".into(),
        TaskKind::Go,
        "go",
        &["test", "./..."],
        root,
        TaskGroup::Test,
    );
    test.problem_matchers = vec![MatcherRef::named("$go-test")];

    vec![build, test]
}

/// Workspace root used by the CLI for detection: the directory of the task
/// document, or the current directory.
pub fn workspace_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn labels(tasks: &[TaskConfig]) -> Vec<&str> {
        tasks.iter().map(|t| t.label.as_str()).collect()
    }

    #[test]
    fn empty_root_detects_nothing() {
        let fs = MockFileSystem::new();
        assert!(detect_tasks(&fs, Path::new("/ws")).is_empty());
    }

    #[test]
    fn detects_cargo_and_npm() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/Cargo.toml", "[package]\nname = \"x\"\n");
        fs.add_file(
            "/ws/package.json",
            r#"{ "name": "x", "scripts": { "build": "tsc", "test": "jest" } }"#,
        );

        let tasks = detect_tasks(&fs, Path::new("/ws"));
        let l = labels(&tasks);
        assert!(l.contains(&"cargo: build"));
        assert!(l.contains(&"cargo: clippy"));
        assert!(l.contains(&"npm: build"));
        assert!(l.contains(&"npm: test"));

        let npm_test = tasks.iter().find(|t| t.label == "npm: test").unwrap();
        assert_eq!(npm_test.kind, TaskKind::Npm);
        assert_eq!(npm_test.args, vec!["run", "test"]);
        assert_eq!(npm_test.group, TaskGroup::Test);
        assert!(tasks.iter().all(|t| t.source == TaskSource::AutoDetected));
    }

    #[test]
    fn makefile_targets_skip_variables_and_duplicates() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/ws/Makefile",
            "CC := gcc\nall: build\nbuild: main.o\n\tcc main.o\n.PHONY: all\nclean:\n\trm -f *.o\nbuild:\n",
        );

        let tasks = detect_tasks(&fs, Path::new("/ws"));
        assert_eq!(labels(&tasks), vec!["make: all", "make: build", "make: clean"]);
        assert_eq!(tasks[2].group, TaskGroup::Clean);
    }

    #[test]
    fn broken_package_json_is_skipped() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/package.json", "{ not json");
        fs.add_file("/ws/go.mod", "module x\n");

        let tasks = detect_tasks(&fs, Path::new("/ws"));
        assert_eq!(labels(&tasks), vec!["go: build", "go: test"]);
        assert_eq!(tasks[1].problem_matchers, vec![MatcherRef::named("$go-test")]);
    }
}
