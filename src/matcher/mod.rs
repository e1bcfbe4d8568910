// src/matcher/mod.rs

//! Problem matchers: turning raw tool output into structured diagnostics.
//!
//! A matcher is pure data ([`MatcherDefinition`]): an ordered list of regex
//! patterns using named capture groups (`file`, `line`, `column`, `severity`,
//! `code`, `message`), plus optional background `begins`/`ends` patterns for
//! watch-mode tools.
//!
//! - [`pattern`] compiles a definition and runs the per-line state machine.
//! - [`catalog`] holds the fixed built-in dialects and user matchers, and
//!   implements [`MatcherCatalog::parse`].
//!
//! Matching never fails on input: unrecognised lines are skipped, and a
//! matcher that fails to compile is rejected when it is registered.

pub mod catalog;
pub mod pattern;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use catalog::{BUILTIN_MATCHER_NAMES, MatcherCatalog};
pub use pattern::{BackgroundSignal, CompiledMatcher, MatcherSession};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// Normalise a captured severity string. Comparison is case-insensitive;
    /// anything that isn't error/warning/info/hint is `Info`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "hint" => Severity::Hint,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        };
        f.write_str(s)
    }
}

/// One matcher hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDiagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    pub code: Option<String>,
    /// Name of the matcher that produced this diagnostic.
    pub source: String,
}

/// A single pattern inside a matcher definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDefinition {
    pub regexp: String,

    /// Only meaningful on the last pattern: keep matching consecutive lines
    /// with this pattern, one diagnostic per line.
    #[serde(default, rename = "loop", skip_serializing_if = "std::ops::Not::not")]
    pub repeat: bool,
}

impl PatternDefinition {
    pub fn new(regexp: impl Into<String>) -> Self {
        Self {
            regexp: regexp.into(),
            repeat: false,
        }
    }

    pub fn looping(regexp: impl Into<String>) -> Self {
        Self {
            regexp: regexp.into(),
            repeat: true,
        }
    }
}

/// Background (watch mode) markers.
///
/// An `errors` named group in `ends_pattern`, if present, is read as the
/// number of errors in the compile that just finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundDefinition {
    pub begins_pattern: String,
    pub ends_pattern: String,
}

/// Data description of a problem matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherDefinition {
    pub name: String,

    /// Severity used when the patterns capture none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    pub patterns: Vec<PatternDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundDefinition>,
}

/// Reference to a matcher from a task: either a catalog name or an inline
/// definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherRef {
    Named(String),
    Inline(MatcherDefinition),
}

impl MatcherRef {
    pub fn named(name: impl Into<String>) -> Self {
        MatcherRef::Named(name.into())
    }
}

/// What one streamed line produced across all matchers of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineReport {
    pub diagnostics: Vec<ParsedDiagnostic>,
    pub signal: Option<BackgroundSignal>,
}

/// Incremental parser over a live output stream.
///
/// Used by the engine for background tasks, where begin/end markers and
/// error diagnostics have to be observed as lines arrive rather than
/// recomputed from the whole buffer.
#[derive(Debug)]
pub struct StreamParser {
    sessions: Vec<MatcherSession>,
    base_path: PathBuf,
}

impl StreamParser {
    pub fn new(matchers: Vec<Arc<CompiledMatcher>>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            sessions: matchers.into_iter().map(MatcherSession::new).collect(),
            base_path: base_path.into(),
        }
    }

    pub fn feed(&mut self, line: &str) -> LineReport {
        let mut report = LineReport::default();
        for session in &mut self.sessions {
            if report.signal.is_none() {
                report.signal = session.matcher().background_signal(line);
            }
            if let Some(diag) = session.feed(line, &self.base_path) {
                report.diagnostics.push(diag);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_normalisation_is_case_insensitive_and_defaults_to_info() {
        assert_eq!(Severity::normalize("ERROR"), Severity::Error);
        assert_eq!(Severity::normalize(" Warning "), Severity::Warning);
        assert_eq!(Severity::normalize("hint"), Severity::Hint);
        assert_eq!(Severity::normalize("note"), Severity::Info);
        assert_eq!(Severity::normalize("fatal"), Severity::Info);
    }

    #[test]
    fn stream_parser_reports_signal_and_diagnostics_for_the_same_line() {
        let def = MatcherDefinition {
            name: "watcher".into(),
            severity: Some("error".into()),
            patterns: vec![PatternDefinition::new(
                r"^(?P<file>\S+):(?P<line>\d+): (?P<message>.+)$",
            )],
            background: Some(BackgroundDefinition {
                begins_pattern: "^build started".into(),
                ends_pattern: r"^build finished \((?P<errors>\d+) errors\)".into(),
            }),
        };
        let compiled = Arc::new(CompiledMatcher::compile(&def).expect("compiles"));
        let mut parser = StreamParser::new(vec![compiled], "");

        assert_eq!(parser.feed("build started").signal, Some(BackgroundSignal::Begin));

        let report = parser.feed("a.c:3: boom");
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.signal, None);

        assert_eq!(
            parser.feed("build finished (1 errors)").signal,
            Some(BackgroundSignal::End { errors: Some(1) })
        );
    }
}
