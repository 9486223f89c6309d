use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::unit::{CompilationUnit, UnitStatus};
use crate::errors::UnitError;
use crate::models::DocumentKind;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
/// Startup failures: invalid options or a failed update check.
pub const EXIT_STARTUP: u8 = 2;
/// 128 + SIGINT, the conventional status for a user-interrupted run.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Terminal outcome of one unit.
#[derive(Debug)]
pub struct UnitReport {
    pub kind: DocumentKind,
    pub source: PathBuf,
    pub status: UnitStatus,
    /// Set only when the unit succeeded.
    pub output: Option<PathBuf>,
    /// Set only when the unit failed.
    pub error: Option<UnitError>,
    pub elapsed: Duration,
}

impl UnitReport {
    pub(crate) fn new(
        unit: &CompilationUnit,
        output: Option<PathBuf>,
        error: Option<UnitError>,
        elapsed: Duration,
    ) -> Self {
        Self {
            kind: unit.kind(),
            source: unit.source().to_path_buf(),
            status: unit.status(),
            output,
            error,
            elapsed,
        }
    }

    /// One-line outcome for the end-of-run summary.
    pub fn summary(&self) -> String {
        let detail = match (&self.output, &self.error) {
            (Some(output), _) => format!(" -> {}", output.display()),
            (None, Some(err)) => format!(" [{}] {err}", err.code()),
            (None, None) => String::new(),
        };
        format!(
            "{} ({}) {}{} in {} ms",
            self.kind,
            self.source.display(),
            self.status,
            detail,
            self.elapsed.as_millis()
        )
    }

    /// Report for a worker that died without producing one.
    pub(crate) fn panicked(kind: DocumentKind, source: PathBuf, detail: String) -> Self {
        Self {
            kind,
            source,
            status: UnitStatus::Failed,
            output: None,
            error: Some(UnitError::Panicked(detail)),
            elapsed: Duration::ZERO,
        }
    }
}

/// Aggregate outcome of a dispatch run, keyed by document kind.
#[derive(Debug, Default)]
pub struct DispatchResult {
    reports: BTreeMap<DocumentKind, UnitReport>,
}

impl DispatchResult {
    pub(crate) fn record(&mut self, report: UnitReport) {
        self.reports.insert(report.kind, report);
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[cfg(test)]
    pub fn get(&self, kind: DocumentKind) -> Option<&UnitReport> {
        self.reports.get(&kind)
    }

    #[cfg(test)]
    pub fn status(&self, kind: DocumentKind) -> Option<UnitStatus> {
        self.get(kind).map(|r| r.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitReport> {
        self.reports.values()
    }

    pub fn count(&self, status: UnitStatus) -> usize {
        self.iter().filter(|r| r.status == status).count()
    }

    /// 0 when every unit succeeded (or none ran); failures outrank interruptions.
    pub fn exit_code(&self) -> u8 {
        if self.count(UnitStatus::Failed) > 0 {
            EXIT_FAILED
        } else if self.count(UnitStatus::Interrupted) > 0 {
            EXIT_INTERRUPTED
        } else {
            EXIT_SUCCESS
        }
    }
}
