//! Compilation units, one JSON document to one PDF each.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::result::UnitReport;
use crate::errors::{ConfigError, UnitError};
use crate::models::DocumentKind;
use crate::render::{RenderBackend, RenderContext, RenderJob, RenderOptions, RenderOutcome};

/// Lifecycle of a unit. Transitions only move forward; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Interrupted,
}

impl UnitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Succeeded | UnitStatus::Failed | UnitStatus::Interrupted
        )
    }

    /// Pending may go anywhere else (a unit can fail or be cancelled before it starts);
    /// Running may only reach a terminal state.
    pub fn can_advance_to(&self, next: UnitStatus) -> bool {
        match self {
            UnitStatus::Pending => next != UnitStatus::Pending,
            UnitStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Succeeded => "succeeded",
            UnitStatus::Failed => "failed",
            UnitStatus::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    kind: DocumentKind,
    source: PathBuf,
    output: PathBuf,
    options: RenderOptions,
    status: UnitStatus,
}

impl CompilationUnit {
    pub fn new(kind: DocumentKind, source: PathBuf, output: PathBuf, options: RenderOptions) -> Self {
        Self {
            kind,
            source,
            output,
            options,
            status: UnitStatus::Pending,
        }
    }

    /// One unit per source path present in the configuration, in submission order.
    pub fn derive_all(config: &Config) -> Vec<CompilationUnit> {
        config
            .sources()
            .into_iter()
            .map(|(kind, source)| {
                CompilationUnit::new(
                    kind,
                    source.to_path_buf(),
                    config.output_path(kind),
                    config.render_options(),
                )
            })
            .collect()
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn job(&self) -> RenderJob<'_> {
        RenderJob {
            kind: self.kind,
            source: &self.source,
            output: &self.output,
            options: &self.options,
        }
    }

    /// Applies a transition. Illegal transitions are ignored and reported as `false`.
    pub fn advance(&mut self, next: UnitStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    fn transition(&mut self, next: UnitStatus, ctx: &RenderContext<'_>) {
        let previous = self.status;
        if self.advance(next) {
            ctx.trace(&format!("status {previous} -> {next}"));
        }
    }

    /// Checks that the source resolves to a readable regular file.
    pub fn resolve_source(&self) -> Result<(), ConfigError> {
        let path = &self.source;
        match path.metadata() {
            Ok(meta) if !meta.is_file() => return Err(ConfigError::NotAFile(path.clone())),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingSource(path.clone()))
            }
            Err(source) => {
                return Err(ConfigError::UnreadableSource {
                    path: path.clone(),
                    source,
                })
            }
        }
        File::open(path).map(drop).map_err(|source| ConfigError::UnreadableSource {
            path: path.clone(),
            source,
        })
    }

    /// Ends a unit that never started: Pending to Failed.
    pub fn reject(mut self, err: UnitError) -> UnitReport {
        self.advance(UnitStatus::Failed);
        error!(unit = %self.kind, code = err.code(), error = %err, "unit failed");
        UnitReport::new(&self, None, Some(err), std::time::Duration::ZERO)
    }

    /// Ends a unit whose cancellation was observed before it started: Pending to Interrupted.
    pub fn cancel_before_start(mut self, ctx: &RenderContext<'_>) -> UnitReport {
        self.transition(UnitStatus::Interrupted, ctx);
        warn!(unit = %self.kind, "unit interrupted before starting");
        UnitReport::new(&self, None, None, std::time::Duration::ZERO)
    }

    /// Runs the unit to a terminal state on the current thread.
    pub fn execute(mut self, backend: &dyn RenderBackend, ctx: &RenderContext<'_>) -> UnitReport {
        let started = Instant::now();
        self.transition(UnitStatus::Running, ctx);
        ctx.trace(&format!("invoking {} backend", backend.name()));

        let result = backend.render(&self.job(), ctx);
        let elapsed = started.elapsed();

        match result {
            Ok(RenderOutcome::Completed { output, pages }) => {
                self.transition(UnitStatus::Succeeded, ctx);
                info!(
                    unit = %self.kind,
                    output = %output.display(),
                    pages,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "unit succeeded"
                );
                UnitReport::new(&self, Some(output), None, elapsed)
            }
            Ok(RenderOutcome::Interrupted { stage }) => {
                self.transition(UnitStatus::Interrupted, ctx);
                warn!(unit = %self.kind, stage = %stage, "unit interrupted");
                UnitReport::new(&self, None, None, elapsed)
            }
            Err(err) => {
                self.transition(UnitStatus::Failed, ctx);
                let err = UnitError::from(err);
                error!(unit = %self.kind, code = err.code(), error = %err, "unit failed");
                UnitReport::new(&self, None, Some(err), elapsed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: PathBuf) -> CompilationUnit {
        CompilationUnit::new(
            DocumentKind::Cv,
            source,
            PathBuf::from("cv.pdf"),
            RenderOptions::default(),
        )
    }

    #[test]
    fn test_forward_transitions_are_allowed() {
        let mut unit = unit(PathBuf::from("cv.json"));
        assert!(unit.advance(UnitStatus::Running));
        assert!(unit.advance(UnitStatus::Succeeded));
        assert_eq!(unit.status(), UnitStatus::Succeeded);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [UnitStatus::Succeeded, UnitStatus::Failed, UnitStatus::Interrupted] {
            let mut unit = unit(PathBuf::from("cv.json"));
            unit.advance(UnitStatus::Running);
            unit.advance(terminal);
            for next in [
                UnitStatus::Pending,
                UnitStatus::Running,
                UnitStatus::Succeeded,
                UnitStatus::Failed,
                UnitStatus::Interrupted,
            ] {
                assert!(!unit.advance(next), "{terminal} -> {next} must be rejected");
            }
            assert_eq!(unit.status(), terminal);
        }
    }

    #[test]
    fn test_running_cannot_go_back_to_pending() {
        let mut unit = unit(PathBuf::from("cv.json"));
        unit.advance(UnitStatus::Running);
        assert!(!unit.advance(UnitStatus::Pending));
        assert!(!unit.advance(UnitStatus::Running));
    }

    #[test]
    fn test_pending_can_fail_before_starting() {
        let mut unit = unit(PathBuf::from("cv.json"));
        assert!(unit.advance(UnitStatus::Failed));
    }

    #[test]
    fn test_resolve_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = unit(dir.path().join("missing.json")).resolve_source().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSource(_)));
    }

    #[test]
    fn test_resolve_source_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = unit(dir.path().to_path_buf()).resolve_source().unwrap_err();
        assert!(matches!(err, ConfigError::NotAFile(_)));
    }

    #[test]
    fn test_resolve_source_accepts_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(unit(path).resolve_source().is_ok());
    }
}
