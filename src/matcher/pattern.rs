// src/matcher/pattern.rs

//! Compiled matchers and the per-line matching state machine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{Captures, Regex};

use crate::errors::{Result, TaskdeckError};
use crate::matcher::{MatcherDefinition, ParsedDiagnostic, Severity};

/// Background marker observed on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundSignal {
    /// A compile cycle started.
    Begin,
    /// A compile cycle finished. `errors` is the count read from the end
    /// pattern's `errors` group, when it has one.
    End { errors: Option<u32> },
}

#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    repeat: bool,
}

#[derive(Debug)]
struct CompiledBackground {
    begins: Regex,
    ends: Regex,
}

/// A matcher definition with all of its regexes compiled.
pub struct CompiledMatcher {
    name: String,
    default_severity: Option<String>,
    patterns: Vec<CompiledPattern>,
    background: Option<CompiledBackground>,
}

impl fmt::Debug for CompiledMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMatcher")
            .field("name", &self.name)
            .field("patterns", &self.patterns.len())
            .field("background", &self.background.is_some())
            .finish_non_exhaustive()
    }
}

impl CompiledMatcher {
    /// Compile every pattern of `def`.
    ///
    /// Fails with [`TaskdeckError::InvalidMatcherPattern`] on the first
    /// pattern that does not compile, or a config error for a definition
    /// without patterns.
    pub fn compile(def: &MatcherDefinition) -> Result<Self> {
        if def.patterns.is_empty() {
            return Err(TaskdeckError::ConfigError(format!(
                "problem matcher '{}' has no patterns",
                def.name
            )));
        }

        let patterns = def
            .patterns
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    regex: compile_regex(&def.name, &p.regexp)?,
                    repeat: p.repeat,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let background = match &def.background {
            Some(bg) => Some(CompiledBackground {
                begins: compile_regex(&def.name, &bg.begins_pattern)?,
                ends: compile_regex(&def.name, &bg.ends_pattern)?,
            }),
            None => None,
        };

        Ok(Self {
            name: def.name.clone(),
            default_severity: def.severity.clone(),
            patterns,
            background,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Check a line against the background markers.
    pub fn background_signal(&self, line: &str) -> Option<BackgroundSignal> {
        let bg = self.background.as_ref()?;
        if bg.begins.is_match(line) {
            return Some(BackgroundSignal::Begin);
        }
        let caps = bg.ends.captures(line)?;
        let errors = caps
            .name("errors")
            .and_then(|m| m.as_str().trim().parse::<u32>().ok());
        Some(BackgroundSignal::End { errors })
    }

    fn last_index(&self) -> usize {
        self.patterns.len() - 1
    }
}

fn compile_regex(matcher: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| TaskdeckError::InvalidMatcherPattern {
        matcher: matcher.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// Fields captured so far in a multi-line sequence.
#[derive(Debug, Clone, Default)]
struct Captured {
    file: Option<String>,
    line: Option<String>,
    column: Option<String>,
    severity: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl Captured {
    /// Later captures override earlier ones.
    fn merge(&mut self, caps: &Captures<'_>) {
        let take = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        if let Some(v) = take("file") {
            self.file = Some(v);
        }
        if let Some(v) = take("line") {
            self.line = Some(v);
        }
        if let Some(v) = take("column") {
            self.column = Some(v);
        }
        if let Some(v) = take("severity") {
            self.severity = Some(v);
        }
        if let Some(v) = take("code") {
            self.code = Some(v);
        }
        if let Some(v) = take("message") {
            self.message = Some(v);
        }
    }
}

/// Matching state for one matcher over one output stream.
///
/// Pattern *k* is only tried once pattern *k-1* has matched an earlier line.
/// While waiting for pattern *k*, a line that matches the first pattern
/// restarts the sequence and any other line is skipped. A looping last
/// pattern emits for every consecutive match and ends on the first line it
/// does not match.
#[derive(Debug)]
pub struct MatcherSession {
    matcher: Arc<CompiledMatcher>,
    next: usize,
    captured: Captured,
    looped: bool,
}

impl MatcherSession {
    pub fn new(matcher: Arc<CompiledMatcher>) -> Self {
        Self {
            matcher,
            next: 0,
            captured: Captured::default(),
            looped: false,
        }
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    /// Feed one line; returns a diagnostic when a sequence completes.
    pub fn feed(&mut self, line: &str, base_path: &Path) -> Option<ParsedDiagnostic> {
        let matcher = Arc::clone(&self.matcher);
        let last = matcher.last_index();

        if self.next == 0 {
            return self.start(&matcher, line, base_path);
        }

        let pattern = &matcher.patterns[self.next];
        if let Some(caps) = pattern.regex.captures(line) {
            if self.next == last {
                let mut fields = self.captured.clone();
                fields.merge(&caps);
                if pattern.repeat {
                    self.looped = true;
                } else {
                    self.reset();
                }
                return build_diagnostic(&matcher, fields, base_path);
            }
            self.captured.merge(&caps);
            self.next += 1;
            return None;
        }

        if self.looped {
            self.reset();
            return self.start(&matcher, line, base_path);
        }

        if matcher.patterns[0].regex.is_match(line) {
            self.reset();
            return self.start(&matcher, line, base_path);
        }

        None
    }

    fn start(
        &mut self,
        matcher: &CompiledMatcher,
        line: &str,
        base_path: &Path,
    ) -> Option<ParsedDiagnostic> {
        let first = &matcher.patterns[0];
        let caps = first.regex.captures(line)?;

        if matcher.patterns.len() == 1 {
            let mut fields = Captured::default();
            fields.merge(&caps);
            return build_diagnostic(matcher, fields, base_path);
        }

        self.captured = Captured::default();
        self.captured.merge(&caps);
        self.next = 1;
        None
    }

    fn reset(&mut self) {
        self.next = 0;
        self.captured = Captured::default();
        self.looped = false;
    }
}

fn build_diagnostic(
    matcher: &CompiledMatcher,
    fields: Captured,
    base_path: &Path,
) -> Option<ParsedDiagnostic> {
    let file = fields.file?;
    let message = fields.message?;
    let severity = fields
        .severity
        .as_deref()
        .or(matcher.default_severity.as_deref())
        .map(Severity::normalize)
        .unwrap_or(Severity::Info);

    Some(ParsedDiagnostic {
        file: resolve_path(base_path, file.trim()),
        line: parse_position(fields.line.as_deref()),
        column: parse_position(fields.column.as_deref()),
        severity,
        message: message.trim().to_string(),
        code: fields.code.filter(|c| !c.is_empty()),
        source: matcher.name.clone(),
    })
}

fn parse_position(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(1)
}

/// Resolve a captured path against `base_path`; absolute paths are kept.
pub fn resolve_path(base_path: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_path.join(path)
    }
}
