// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod history;
pub mod logging;
pub mod matcher;
pub mod registry;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::model::TasksDocument;
use crate::config::{default_config_path, load_and_validate};
use crate::dag::resolve_execution_order;
use crate::engine::{RunStatus, TaskScheduler};
use crate::exec::{ConsoleSink, OutputSink, RealProcessBackend};
use crate::fs::RealFileSystem;
use crate::history::HistoryStore;
use crate::matcher::{CompiledMatcher, MatcherCatalog, MatcherRef, ParsedDiagnostic};
use crate::registry::detect::workspace_root;
use crate::registry::{TaskRegistry, detect_tasks};
use crate::types::TaskGroup;
use crate::watch::{RunOnSaveTrigger, SaveRule, spawn_save_watcher};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);

    match args.command {
        Command::List { group } => {
            let ws = Workspace::load(&config_path, !args.no_detect)?;
            print_tasks(&ws, group);
            Ok(())
        }
        Command::Run {
            label,
            group,
            terminal,
        } => {
            let ws = Workspace::load(&config_path, !args.no_detect)?;
            run_task(&ws, label, group, terminal).await
        }
        Command::Watch => {
            let ws = Workspace::load(&config_path, !args.no_detect)?;
            watch(&ws).await
        }
        Command::Parse {
            matchers,
            base,
            json,
            file,
        } => parse_output(&config_path, &matchers, base, json, file.as_deref()),
        Command::Matchers => {
            let catalog = load_catalog(&config_path)?;
            print_matchers(&catalog);
            Ok(())
        }
        Command::Check => check(&config_path),
    }
}

/// Everything a run needs, built from one task document.
struct Workspace {
    doc: TasksDocument,
    root: PathBuf,
    registry: Arc<RwLock<TaskRegistry>>,
    catalog: Arc<MatcherCatalog>,
}

impl Workspace {
    fn load(config_path: &Path, detect: bool) -> Result<Self> {
        let doc = load_document(config_path)?;
        let root = workspace_root(config_path);

        let mut registry = TaskRegistry::from_document(&doc)?;
        if detect {
            registry.set_detected(detect_tasks(&RealFileSystem, &root));
        }
        let (catalog, _rejected) = MatcherCatalog::with_user_matchers(&doc.matchers);

        Ok(Self {
            doc,
            root,
            registry: Arc::new(RwLock::new(registry)),
            catalog: Arc::new(catalog),
        })
    }

    fn scheduler(&self, sink: Arc<dyn OutputSink>) -> TaskScheduler {
        TaskScheduler::new(
            Arc::clone(&self.registry),
            Arc::new(Mutex::new(HistoryStore::new(self.doc.settings.history_limit))),
            Arc::clone(&self.catalog),
            Arc::new(RealProcessBackend::new()),
            sink,
        )
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, TaskRegistry> {
        self.registry
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A missing document is treated as empty so detected tasks still work.
fn load_document(config_path: &Path) -> Result<TasksDocument> {
    if !config_path.exists() {
        warn!(path = %config_path.display(), "task document not found; using detected tasks only");
        return Ok(TasksDocument::default());
    }
    load_and_validate(config_path)
        .with_context(|| format!("loading task document {}", config_path.display()))
}

fn load_catalog(config_path: &Path) -> Result<MatcherCatalog> {
    if !config_path.exists() {
        return Ok(MatcherCatalog::builtin());
    }
    let doc = load_document(config_path)?;
    Ok(MatcherCatalog::with_user_matchers(&doc.matchers).0)
}

fn print_tasks(ws: &Workspace, group: Option<TaskGroup>) {
    let tasks: Vec<_> = ws
        .registry()
        .all_tasks()
        .into_iter()
        .filter(|t| group.is_none_or(|g| t.group == g))
        .collect();

    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    let width = tasks.iter().map(|t| t.label.len()).max().unwrap_or(0);
    for task in tasks {
        let mut flags = vec![task.source.to_string()];
        if task.group != TaskGroup::None {
            flags.push(if task.is_default {
                format!("{} (default)", task.group)
            } else {
                task.group.to_string()
            });
        }
        if task.is_background {
            flags.push("background".into());
        }
        let detail = task.detail.clone().unwrap_or_else(|| task.command_line());
        println!("{:<width$}  [{}]  {}", task.label, flags.join(", "), detail);
    }
}

async fn run_task(
    ws: &Workspace,
    label: Option<String>,
    group: Option<TaskGroup>,
    terminal: bool,
) -> Result<()> {
    let label = match (label, group) {
        (Some(label), _) => label,
        (None, Some(group)) => ws
            .registry()
            .default_task(group)
            .map(|t| t.label)
            .ok_or_else(|| anyhow!("no task in group '{group}'"))?,
        (None, None) => bail!("give a task label or --group"),
    };

    let scheduler = ws.scheduler(Arc::new(ConsoleSink::new()));
    let handle = if terminal {
        scheduler.run_in_terminal(&label)?
    } else {
        scheduler.run(&label)?
    };

    let run = tokio::select! {
        run = handle.wait() => run,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!(task = %label, "interrupted; cancelling run");
            scheduler.cancel(handle.id())?;
            handle.wait().await
        }
    };

    let diagnostics = scheduler.diagnostics(run.id)?;
    for diag in &diagnostics {
        println!("{}", format_diagnostic(diag));
    }

    if run.status == RunStatus::Completed {
        return Ok(());
    }
    let reason = run
        .failure_reason
        .map(|r| format!(": {r}"))
        .unwrap_or_default();
    bail!("task '{label}' {}{reason}", run.status)
}

async fn watch(ws: &Workspace) -> Result<()> {
    let scheduler = ws.scheduler(Arc::new(ConsoleSink::new()));
    let started = scheduler.run_folder_open_tasks();

    let trigger = Arc::new(RunOnSaveTrigger::new(
        ws.root.clone(),
        Arc::new(scheduler.clone()),
    ));
    for rule in &ws.doc.run_on_save {
        if let Err(err) = trigger.add_rule(rule.clone()) {
            warn!(rule = %rule.id, error = %err, "skipping run-on-save rule");
        }
    }
    info!(
        folder_open = started.len(),
        rules = trigger.rules().len(),
        "watching; press Ctrl-C to stop"
    );

    let _watcher = spawn_save_watcher(ws.root.clone(), Arc::clone(&trigger))?;
    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    trigger.cancel_pending();
    let stopped = scheduler.stop_all();
    info!(stopped, "shutting down");
    Ok(())
}

fn parse_output(
    config_path: &Path,
    names: &[String],
    base: Option<PathBuf>,
    json: bool,
    file: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(config_path)?;
    if let Some(unknown) = names.iter().find(|n| catalog.get(n).is_none()) {
        bail!("unknown problem matcher '{unknown}'");
    }

    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
    };

    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let diagnostics = catalog.parse_named(input.lines(), &names, &base.unwrap_or_default());

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        for diag in &diagnostics {
            println!("{}", format_diagnostic(diag));
        }
    }
    Ok(())
}

fn format_diagnostic(diag: &ParsedDiagnostic) -> String {
    let code = diag
        .code
        .as_ref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default();
    format!(
        "{}:{}:{}: {}: {}{} ({})",
        diag.file.display(),
        diag.line,
        diag.column,
        diag.severity,
        diag.message,
        code,
        diag.source
    )
}

fn print_matchers(catalog: &MatcherCatalog) {
    for name in catalog.names() {
        let origin = if catalog.is_builtin(name) { "built-in" } else { "user" };
        let background = catalog
            .get(name)
            .is_some_and(|m| m.has_background());
        println!(
            "{name}  [{origin}{}]",
            if background { ", background" } else { "" }
        );
    }
}

/// Validate a document and report every problem found, not just the first.
fn check(config_path: &Path) -> Result<()> {
    let doc = load_and_validate(config_path)
        .with_context(|| format!("loading task document {}", config_path.display()))?;

    let mut problems: Vec<String> = Vec::new();
    let (catalog, rejected) = MatcherCatalog::with_user_matchers(&doc.matchers);
    problems.extend(rejected.into_iter().map(|e| e.to_string()));

    let registry = TaskRegistry::from_document(&doc)?;
    for task in registry.all_tasks() {
        if let Err(err) = resolve_execution_order(&task, |l| registry.get(l).cloned()) {
            problems.push(format!("task '{}': {err}", task.label));
        }
        for r in &task.problem_matchers {
            match r {
                MatcherRef::Named(name) if catalog.get(name).is_none() => {
                    problems.push(format!("task '{}': unknown problem matcher '{name}'", task.label));
                }
                MatcherRef::Inline(def) => {
                    if let Err(err) = CompiledMatcher::compile(def) {
                        problems.push(format!("task '{}': {err}", task.label));
                    }
                }
                MatcherRef::Named(_) => {}
            }
        }
    }

    for rule in &doc.run_on_save {
        if let Err(err) = SaveRule::compile(rule.clone()) {
            problems.push(format!("run-on-save '{}': {err}", rule.id));
        }
        if registry.get(&rule.task_id).is_none() {
            problems.push(format!(
                "run-on-save '{}': unknown task '{}'",
                rule.id, rule.task_id
            ));
        }
    }

    if problems.is_empty() {
        println!(
            "{}: ok ({} tasks, {} matchers, {} run-on-save rules)",
            config_path.display(),
            doc.tasks.len(),
            doc.matchers.len(),
            doc.run_on_save.len()
        );
        return Ok(());
    }
    for problem in &problems {
        eprintln!("{problem}");
    }
    bail!("{} problem(s) in {}", problems.len(), config_path.display())
}
