// src/exec/output.rs

//! Where run output goes.
//!
//! The scheduler forwards a task's `presentation` settings untouched; it is
//! up to the sink to decide what revealing, focusing or clearing means.

use std::io::Write;

use tracing::{debug, info};

use crate::engine::{OutputLine, RunId, TaskRun};
use crate::types::Reveal;

/// Surface a run was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Panel,
    Terminal,
}

pub trait OutputSink: Send + Sync {
    /// The run's process has started.
    fn opened(&self, run: &TaskRun, target: OutputTarget);
    fn line(&self, run_id: RunId, label: &str, line: &OutputLine);
    /// The run reached a terminal status.
    fn closed(&self, run: &TaskRun);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn opened(&self, run: &TaskRun, target: OutputTarget) {
        let p = run.config.presentation;
        info!(
            task = %run.label(),
            run_id = %run.id,
            ?target,
            reveal = ?p.reveal,
            panel = ?p.panel,
            focus = p.focus,
            clear = p.clear,
            "output opened"
        );
    }

    fn line(&self, run_id: RunId, label: &str, line: &OutputLine) {
        debug!(task = %label, %run_id, stream = %line.stream, "{}", line.text);
    }

    fn closed(&self, run: &TaskRun) {
        info!(
            task = %run.label(),
            run_id = %run.id,
            status = %run.status,
            exit_code = ?run.exit_code,
            "output closed"
        );
    }
}

/// Sink used by the CLI: prints lines prefixed with the task label.
/// Tasks with `reveal = "never"` stay quiet.
pub struct ConsoleSink {
    quiet: std::sync::Mutex<std::collections::HashSet<RunId>>,
    out: std::sync::Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            quiet: std::sync::Mutex::new(std::collections::HashSet::new()),
            out: std::sync::Mutex::new(Box::new(out)),
        }
    }

    /// Write errors (e.g. a closed pipe) never fail a run.
    fn emit(&self, text: std::fmt::Arguments<'_>) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(err) = out.write_fmt(text).and_then(|()| out.flush()) {
            debug!(error = %err, "console output failed");
        }
    }

    fn is_quiet(&self, run_id: RunId) -> bool {
        self.quiet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&run_id)
    }
}

impl OutputSink for ConsoleSink {
    fn opened(&self, run: &TaskRun, target: OutputTarget) {
        if run.config.presentation.reveal == Reveal::Never {
            self.quiet
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(run.id);
            return;
        }
        if run.config.presentation.clear && target == OutputTarget::Terminal {
            self.emit(format_args!("\x1b[2J\x1b[H"));
        }
        self.emit(format_args!("> {} ({})\n", run.label(), run.config.command_line()));
    }

    fn line(&self, run_id: RunId, label: &str, line: &OutputLine) {
        if self.is_quiet(run_id) {
            return;
        }
        self.emit(format_args!("[{label}] {}\n", line.text));
    }

    fn closed(&self, run: &TaskRun) {
        let was_quiet = self
            .quiet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&run.id);
        if was_quiet {
            return;
        }
        let code = run
            .exit_code
            .map(|c| format!(" (exit {c})"))
            .unwrap_or_default();
        self.emit(format_args!("< {} {}{}\n", run.label(), run.status, code));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::model::TaskConfig;
    use crate::engine::RunStatus;
    use crate::exec::OutputStream;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    fn run_of(label: &str) -> TaskRun {
        let mut run = TaskRun::new(RunId(7), TaskConfig::new(label, "make"));
        run.status = RunStatus::Completed;
        run.exit_code = Some(0);
        run
    }

    fn line(text: &str) -> OutputLine {
        OutputLine {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    #[test]
    fn console_prints_open_lines_and_close() {
        let buf = Shared::default();
        let sink = ConsoleSink::with_writer(buf.clone());
        let run = run_of("build");

        sink.opened(&run, OutputTarget::Panel);
        sink.line(run.id, "build", &line("ok"));
        sink.closed(&run);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "> build (make)\n[build] ok\n< build completed (exit 0)\n");
    }

    #[test]
    fn console_write_errors_do_not_panic() {
        let sink = ConsoleSink::with_writer(ClosedPipe);
        let run = run_of("build");
        sink.opened(&run, OutputTarget::Terminal);
        sink.line(run.id, "build", &line("lost"));
        sink.closed(&run);
    }
}
