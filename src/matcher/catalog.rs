// src/matcher/catalog.rs

//! Built-in matcher dialects and the matcher catalog.
//!
//! Built-ins are described as data in [`BUILTINS`]; adding a dialect means
//! adding an entry, not writing parsing code.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::errors::{Result, TaskdeckError};
use crate::matcher::pattern::CompiledMatcher;
use crate::matcher::{
    BackgroundDefinition, MatcherDefinition, MatcherRef, MatcherSession, ParsedDiagnostic,
    PatternDefinition,
};

struct Builtin {
    name: &'static str,
    severity: Option<&'static str>,
    /// `(regexp, loop)`
    patterns: &'static [(&'static str, bool)],
    /// `(begins, ends)`
    background: Option<(&'static str, &'static str)>,
}

const TSC_PATTERN: &str = r"^(?P<file>[^\s].*?)\((?P<line>\d+),(?P<column>\d+)\):\s+(?P<severity>error|warning|info)\s+(?P<code>TS\d+)\s*:\s*(?P<message>.*)$";

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "$tsc",
        severity: Some("error"),
        patterns: &[(TSC_PATTERN, false)],
        background: None,
    },
    Builtin {
        name: "$tsc-watch",
        severity: Some("error"),
        patterns: &[(TSC_PATTERN, false)],
        background: Some((
            r"(?:Starting compilation in watch mode|File change detected\. Starting incremental compilation)\.\.\.",
            r"Found (?P<errors>\d+) errors?\. Watching for file changes\.",
        )),
    },
    Builtin {
        name: "$eslint-compact",
        severity: Some("warning"),
        patterns: &[(
            r"^(?P<file>.+?): line (?P<line>\d+), col (?P<column>\d+), (?P<severity>Error|Warning|Info) - (?P<message>.+?)(?: \((?P<code>[^()]+)\))?$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$eslint-stylish",
        severity: Some("warning"),
        patterns: &[
            (r"^(?P<file>[^\s].*)$", false),
            (
                r"^\s+(?P<line>\d+):(?P<column>\d+)\s+(?P<severity>error|warning|info)\s+(?P<message>.+?)(?:\s\s+(?P<code>[\w@/-]+))?$",
                true,
            ),
        ],
        background: None,
    },
    Builtin {
        name: "$gcc",
        severity: Some("error"),
        patterns: &[(
            r"^(?P<file>[^\s:][^:]*):(?P<line>\d+):(?:(?P<column>\d+):)?\s+(?:fatal\s+)?(?P<severity>warning|error|note|info)\s*:\s*(?P<message>.*)$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$go",
        severity: Some("error"),
        patterns: &[(
            r"^\s*(?P<file>[^\s:]+\.go):(?P<line>\d+)(?::(?P<column>\d+))?:\s+(?P<message>.*)$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$go-test",
        severity: Some("error"),
        patterns: &[(
            r"^\s+(?P<file>[^\s:]+_test\.go):(?P<line>\d+):\s+(?P<message>.*)$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$python",
        severity: Some("error"),
        patterns: &[
            (r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)"#, false),
            (
                r"^(?P<code>[A-Za-z_][\w.]*):\s*(?P<message>.+)$",
                false,
            ),
        ],
        background: None,
    },
    Builtin {
        name: "$rustc",
        severity: Some("error"),
        patterns: &[
            (
                r"^(?P<severity>error|warning)(?:\[(?P<code>E\d+)\])?:\s*(?P<message>.*)$",
                false,
            ),
            (
                r"^\s*-->\s*(?P<file>.+?):(?P<line>\d+):(?P<column>\d+)\s*$",
                false,
            ),
        ],
        background: None,
    },
    Builtin {
        name: "$msCompile",
        severity: Some("error"),
        patterns: &[(
            r"^\s*(?:\d+>)?(?P<file>\S.*?)\((?P<line>\d+)(?:,(?P<column>\d+))?(?:,\d+,\d+)?\)\s*:\s+(?:\w+\s+)?(?P<severity>error|warning|info)\s+(?P<code>[A-Z]+\d+)\s*:\s*(?P<message>.*?)(?:\s+\[[^\]]*\])?$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$maven",
        severity: Some("error"),
        patterns: &[(
            r"^\[(?P<severity>ERROR|WARNING|INFO)\]\s+(?P<file>.+?\.java):\[(?P<line>\d+),(?P<column>\d+)\]\s+(?P<message>.*)$",
            false,
        )],
        background: None,
    },
    Builtin {
        name: "$javac",
        severity: Some("error"),
        patterns: &[(
            r"^(?P<file>[^\s:][^:]*\.java):(?P<line>\d+):\s+(?P<severity>error|warning):\s+(?P<message>.*)$",
            false,
        )],
        background: None,
    },
];

/// Names of all built-in matchers, in catalog order.
pub const BUILTIN_MATCHER_NAMES: &[&str] = &[
    "$tsc",
    "$tsc-watch",
    "$eslint-compact",
    "$eslint-stylish",
    "$gcc",
    "$go",
    "$go-test",
    "$python",
    "$rustc",
    "$msCompile",
    "$maven",
    "$javac",
];

impl Builtin {
    fn definition(&self) -> MatcherDefinition {
        MatcherDefinition {
            name: self.name.to_string(),
            severity: self.severity.map(str::to_string),
            patterns: self
                .patterns
                .iter()
                .map(|(regexp, repeat)| PatternDefinition {
                    regexp: (*regexp).to_string(),
                    repeat: *repeat,
                })
                .collect(),
            background: self.background.map(|(begins, ends)| BackgroundDefinition {
                begins_pattern: begins.to_string(),
                ends_pattern: ends.to_string(),
            }),
        }
    }
}

/// Ordered set of compiled matchers: built-ins first, then user matchers in
/// registration order.
#[derive(Debug)]
pub struct MatcherCatalog {
    matchers: Vec<Arc<CompiledMatcher>>,
    index: HashMap<String, usize>,
    builtin_count: usize,
}

impl Default for MatcherCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MatcherCatalog {
    /// Catalog containing only the built-in dialects.
    pub fn builtin() -> Self {
        let mut catalog = Self {
            matchers: Vec::with_capacity(BUILTINS.len()),
            index: HashMap::new(),
            builtin_count: 0,
        };
        for builtin in BUILTINS {
            match CompiledMatcher::compile(&builtin.definition()) {
                Ok(compiled) => catalog.push(Arc::new(compiled)),
                Err(err) => error!(matcher = builtin.name, error = %err, "built-in matcher failed to compile"),
            }
        }
        catalog.builtin_count = catalog.matchers.len();
        catalog
    }

    /// Built-ins plus the given user definitions. Definitions that fail to
    /// compile are left out and returned alongside the catalog.
    pub fn with_user_matchers(defs: &[MatcherDefinition]) -> (Self, Vec<TaskdeckError>) {
        let mut catalog = Self::builtin();
        let mut rejected = Vec::new();
        for def in defs {
            if let Err(err) = catalog.register(def) {
                warn!(matcher = %def.name, error = %err, "excluding problem matcher");
                rejected.push(err);
            }
        }
        (catalog, rejected)
    }

    /// Register a user matcher. Re-registering a user name replaces it in
    /// place; built-in names cannot be overridden.
    pub fn register(&mut self, def: &MatcherDefinition) -> Result<()> {
        if let Some(&idx) = self.index.get(&def.name) {
            if idx < self.builtin_count {
                return Err(TaskdeckError::ConfigError(format!(
                    "problem matcher '{}' is built in and cannot be redefined",
                    def.name
                )));
            }
            self.matchers[idx] = Arc::new(CompiledMatcher::compile(def)?);
            return Ok(());
        }
        let compiled = CompiledMatcher::compile(def)?;
        self.push(Arc::new(compiled));
        debug!(matcher = %def.name, "registered problem matcher");
        Ok(())
    }

    fn push(&mut self, matcher: Arc<CompiledMatcher>) {
        self.index
            .insert(matcher.name().to_string(), self.matchers.len());
        self.matchers.push(matcher);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompiledMatcher>> {
        self.index.get(name).map(|&idx| &self.matchers[idx])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(|m| m.name())
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&idx| idx < self.builtin_count)
    }

    /// Resolve references to compiled matchers in catalog order.
    ///
    /// Named references are sorted by their catalog position and
    /// de-duplicated; inline definitions follow in request order. Unknown
    /// names and inline definitions that fail to compile are skipped.
    pub fn resolve(&self, refs: &[MatcherRef]) -> Vec<Arc<CompiledMatcher>> {
        let mut named: Vec<usize> = Vec::new();
        let mut inline = Vec::new();

        for r in refs {
            match r {
                MatcherRef::Named(name) => match self.index.get(name) {
                    Some(&idx) => {
                        if !named.contains(&idx) {
                            named.push(idx);
                        }
                    }
                    None => warn!(matcher = %name, "unknown problem matcher; skipping"),
                },
                MatcherRef::Inline(def) => match CompiledMatcher::compile(def) {
                    Ok(compiled) => inline.push(Arc::new(compiled)),
                    Err(err) => {
                        warn!(matcher = %def.name, error = %err, "skipping invalid inline problem matcher")
                    }
                },
            }
        }

        named.sort_unstable();
        named
            .into_iter()
            .map(|idx| Arc::clone(&self.matchers[idx]))
            .chain(inline)
            .collect()
    }

    /// Parse `lines` with every referenced matcher and concatenate the
    /// results, one matcher after the other.
    pub fn parse<I, S>(&self, lines: I, refs: &[MatcherRef], base_path: &Path) -> Vec<ParsedDiagnostic>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = self.resolve(refs);
        if matchers.is_empty() {
            return Vec::new();
        }

        let lines: Vec<S> = lines.into_iter().collect();
        let mut out = Vec::new();
        for matcher in matchers {
            let mut session = MatcherSession::new(matcher);
            for line in &lines {
                if let Some(diag) = session.feed(line.as_ref(), base_path) {
                    out.push(diag);
                }
            }
        }
        out
    }

    /// Convenience over [`MatcherCatalog::parse`] taking plain names.
    pub fn parse_named<I, S>(&self, lines: I, names: &[&str], base_path: &Path) -> Vec<ParsedDiagnostic>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let refs: Vec<MatcherRef> = names.iter().map(|n| MatcherRef::named(*n)).collect();
        self.parse(lines, &refs, base_path)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::matcher::Severity;

    fn parse(names: &[&str], lines: &[&str]) -> Vec<ParsedDiagnostic> {
        MatcherCatalog::builtin().parse_named(lines.iter(), names, Path::new(""))
    }

    #[test]
    fn every_builtin_compiles_and_is_listed() {
        let catalog = MatcherCatalog::builtin();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, BUILTIN_MATCHER_NAMES);
        assert!(catalog.get("$tsc-watch").is_some_and(|m| m.has_background()));
    }

    #[test]
    fn tsc_line_yields_exactly_one_diagnostic() {
        let diags = parse(
            &["$tsc"],
            &["src/app.ts(10,5): error TS2322: Type 'string' is not assignable."],
        );
        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.file, PathBuf::from("src/app.ts"));
        assert_eq!((d.line, d.column), (10, 5));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code.as_deref(), Some("TS2322"));
        assert_eq!(d.message, "Type 'string' is not assignable.");
        assert_eq!(d.source, "$tsc");
    }

    #[test]
    fn eslint_compact_and_stylish() {
        let compact = parse(
            &["$eslint-compact"],
            &["/w/a.js: line 3, col 7, Error - 'x' is defined but never used. (no-unused-vars)"],
        );
        assert_eq!(compact.len(), 1);
        assert_eq!(compact[0].file, PathBuf::from("/w/a.js"));
        assert_eq!(compact[0].severity, Severity::Error);
        assert_eq!(compact[0].code.as_deref(), Some("no-unused-vars"));
        assert_eq!(compact[0].message, "'x' is defined but never used.");

        let stylish = parse(
            &["$eslint-stylish"],
            &[
                "/w/src/index.js",
                "   1:10  error    'x' is defined but never used  no-unused-vars",
                "   4:1   warning  Unexpected console statement    no-console",
                "",
                "✖ 2 problems (1 error, 1 warning)",
            ],
        );
        assert_eq!(stylish.len(), 2);
        assert_eq!(stylish[0].file, PathBuf::from("/w/src/index.js"));
        assert_eq!((stylish[0].line, stylish[0].column), (1, 10));
        assert_eq!(stylish[0].code.as_deref(), Some("no-unused-vars"));
        assert_eq!(stylish[0].message, "'x' is defined but never used");
        assert_eq!(stylish[1].severity, Severity::Warning);
        assert_eq!(stylish[1].code.as_deref(), Some("no-console"));
    }

    #[test]
    fn gcc_note_maps_to_info_and_column_is_optional() {
        let diags = parse(
            &["$gcc"],
            &[
                "main.c:12:5: error: expected ';' before '}' token",
                "main.c:3: note: declared here",
                "In file included from x.h:1:",
            ],
        );
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[1].severity, Severity::Info);
        assert_eq!((diags[1].line, diags[1].column), (3, 1));
    }

    #[test]
    fn go_build_and_test_output() {
        let build = parse(&["$go"], &["./main.go:10:2: undefined: foo"]);
        assert_eq!(build.len(), 1);
        assert_eq!(build[0].file, PathBuf::from("./main.go"));
        assert_eq!(build[0].severity, Severity::Error);

        let test = parse(
            &["$go-test"],
            &["--- FAIL: TestAdd (0.00s)", "    math_test.go:14: expected 3, got 4"],
        );
        assert_eq!(test.len(), 1);
        assert_eq!(test[0].line, 14);
        assert_eq!(test[0].message, "expected 3, got 4");
    }

    #[test]
    fn python_traceback_uses_last_frame() {
        let diags = parse(
            &["$python"],
            &[
                "Traceback (most recent call last):",
                "  File \"app/main.py\", line 3, in <module>",
                "    run()",
                "  File \"app/lib.py\", line 9, in run",
                "    raise ValueError(\"bad input\")",
                "ValueError: bad input",
            ],
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].file, PathBuf::from("app/lib.py"));
        assert_eq!(diags[0].line, 9);
        assert_eq!(diags[0].code.as_deref(), Some("ValueError"));
        assert_eq!(diags[0].message, "bad input");
    }

    #[test]
    fn python_exceptions_without_error_suffix() {
        let diags = parse(
            &["$python"],
            &[
                "Traceback (most recent call last):",
                "  File \"gen.py\", line 12, in <module>",
                "    next(it)",
                "StopIteration: exhausted",
                "  File \"loop.py\", line 4, in main",
                "    time.sleep(1)",
                "KeyboardInterrupt: interrupted",
            ],
        );
        let codes: Vec<_> = diags.iter().map(|d| d.code.as_deref()).collect();
        assert_eq!(codes, vec![Some("StopIteration"), Some("KeyboardInterrupt")]);
        assert_eq!(diags[1].file, PathBuf::from("loop.py"));
        assert_eq!(diags[1].line, 4);
    }

    #[test]
    fn rustc_two_line_diagnostics() {
        let diags = parse(
            &["$rustc"],
            &[
                "warning: unused variable: `x`",
                " --> src/main.rs:2:9",
                "  |",
                "error[E0308]: mismatched types",
                "   --> src/lib.rs:14:5",
                "error: aborting due to 1 previous error",
            ],
        );
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].file, PathBuf::from("src/main.rs"));
        assert_eq!((diags[1].line, diags[1].column), (14, 5));
        assert_eq!(diags[1].code.as_deref(), Some("E0308"));
    }

    #[test]
    fn mscompile_maven_and_javac() {
        let ms = parse(
            &["$msCompile"],
            &["Program.cs(10,5): error CS1002: ; expected [/w/app.csproj]"],
        );
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].code.as_deref(), Some("CS1002"));
        assert_eq!(ms[0].message, "; expected");

        let mvn = parse(
            &["$maven"],
            &["[ERROR] /w/src/App.java:[12,5] cannot find symbol"],
        );
        assert_eq!(mvn.len(), 1);
        assert_eq!(mvn[0].severity, Severity::Error);
        assert_eq!((mvn[0].line, mvn[0].column), (12, 5));

        let javac = parse(&["$javac"], &["App.java:7: warning: [unchecked] unchecked call"]);
        assert_eq!(javac.len(), 1);
        assert_eq!(javac[0].severity, Severity::Warning);
    }

    #[test]
    fn multiple_matchers_concatenate_in_catalog_order_without_dedup() {
        let lines = ["main.c:1:1: error: boom", "lib.go:2:3: also boom"];
        // $go listed first, but $gcc comes first in the catalog.
        let diags = parse(&["$go", "$gcc", "$go"], &lines);
        let sources: Vec<&str> = diags.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["$gcc", "$go"]);
    }

    #[test]
    fn unknown_names_and_invalid_user_matchers_do_not_break_parsing() {
        let broken = MatcherDefinition {
            name: "broken".into(),
            severity: None,
            patterns: vec![PatternDefinition::new("(")],
            background: None,
        };
        let (catalog, rejected) = MatcherCatalog::with_user_matchers(&[broken.clone()]);
        assert_eq!(rejected.len(), 1);
        assert!(catalog.get("broken").is_none());

        let refs = vec![
            MatcherRef::named("$nope"),
            MatcherRef::Inline(broken),
            MatcherRef::named("$tsc"),
        ];
        let diags = catalog.parse(
            ["a.ts(1,1): error TS1: x", "ignored"],
            &refs,
            Path::new("/p"),
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].file, PathBuf::from("/p/a.ts"));
    }

    #[test]
    fn builtins_cannot_be_redefined_but_user_matchers_can() {
        let mut catalog = MatcherCatalog::builtin();
        let mut def = MatcherDefinition {
            name: "$tsc".into(),
            severity: None,
            patterns: vec![PatternDefinition::new("x")],
            background: None,
        };
        assert!(matches!(catalog.register(&def), Err(TaskdeckError::ConfigError(_))));

        def.name = "mine".into();
        catalog.register(&def).expect("register");
        catalog.register(&def).expect("re-register replaces");
        assert_eq!(catalog.names().filter(|n| *n == "mine").count(), 1);
        assert!(!catalog.is_builtin("mine"));
    }
}
