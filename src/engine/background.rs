// src/engine/background.rs

use chrono::{DateTime, Utc};

use crate::engine::BackgroundStatus;
use crate::matcher::{BackgroundSignal, ParsedDiagnostic, Severity};

/// Background state machine for one watch-mode run.
///
/// ```text
/// idle --start--> watching --begin--> compiling --end ok--> watching
///                                         |
///                                         +--end failed--> error --begin--> compiling
/// ```
///
/// An end is a failure when its `errors` count is positive or when an
/// error diagnostic was seen since the last begin.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTracker {
    status: BackgroundStatus,
    errors_seen: bool,
    last_compile_end: Option<DateTime<Utc>>,
}

impl BackgroundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> BackgroundStatus {
        self.status
    }

    pub fn last_compile_end(&self) -> Option<DateTime<Utc>> {
        self.last_compile_end
    }

    pub fn started(&mut self) -> BackgroundStatus {
        self.status = BackgroundStatus::Watching;
        self.status
    }

    /// Feed what one output line produced. Returns the new status when the
    /// line caused a transition.
    pub fn observe(
        &mut self,
        signal: Option<&BackgroundSignal>,
        diagnostics: &[ParsedDiagnostic],
        at: DateTime<Utc>,
    ) -> Option<BackgroundStatus> {
        let line_has_error = diagnostics.iter().any(|d| d.severity == Severity::Error);
        let before = self.status;

        match signal {
            Some(BackgroundSignal::Begin) => {
                self.errors_seen = line_has_error;
                self.status = BackgroundStatus::Compiling;
            }
            Some(BackgroundSignal::End { errors }) => {
                let failed = self.errors_seen || line_has_error || errors.is_some_and(|n| n > 0);
                self.status = if failed {
                    BackgroundStatus::Error
                } else {
                    BackgroundStatus::Watching
                };
                self.errors_seen = false;
                self.last_compile_end = Some(at);
                // A compile end is reported even when the status is unchanged.
                return Some(self.status);
            }
            None => self.errors_seen |= line_has_error,
        }

        (self.status != before).then_some(self.status)
    }

    /// The process went away on its own.
    pub fn exited(&mut self) -> BackgroundStatus {
        self.status = BackgroundStatus::Error;
        self.status
    }
}
