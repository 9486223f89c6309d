// Render backend: JSON document → PDF artifact.
// The dispatcher only sees the `RenderBackend` trait; `DocumentBackend` is the default.
// Rendering is synchronous and runs on a blocking worker thread.

pub mod analyze;
pub mod backend;
pub mod layout;
pub mod metrics;
pub mod pdf;
pub mod style;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::RenderError;
use crate::models::DocumentKind;

pub use backend::DocumentBackend;
pub use style::{ContentFlags, RenderOptions, Rgb, StyleFlags};

/// Version of the bundled render backend, reported by `--version` and compared by the updater.
pub const BACKEND_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Render stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Analyze,
    Layout,
    Encode,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Analyze => "analyze",
            Stage::Layout => "layout",
            Stage::Encode => "encode",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation check. Backends call it between stages.
pub trait Checkpoint: Send + Sync {
    fn should_cancel(&self) -> bool;
}

/// A checkpoint that never fires.
#[cfg(test)]
pub struct NeverCancel;

#[cfg(test)]
impl Checkpoint for NeverCancel {
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Everything a backend needs to know about the job it is running.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub kind: DocumentKind,
    pub source: &'a Path,
    pub output: &'a Path,
    pub options: &'a RenderOptions,
}

/// Per-unit execution context handed to the backend.
pub struct RenderContext<'a> {
    unit: DocumentKind,
    debug: bool,
    checkpoint: &'a dyn Checkpoint,
}

impl<'a> RenderContext<'a> {
    pub fn new(unit: DocumentKind, debug: bool, checkpoint: &'a dyn Checkpoint) -> Self {
        Self {
            unit,
            debug,
            checkpoint,
        }
    }

    pub fn should_cancel(&self) -> bool {
        self.checkpoint.should_cancel()
    }

    /// Records a stage transition. Only emitted in debug mode.
    pub fn enter(&self, stage: Stage) {
        if self.debug {
            debug!(unit = %self.unit, stage = %stage, "entering stage");
        }
    }

    /// Free-form trace line, only emitted in debug mode.
    pub fn trace(&self, message: &str) {
        if self.debug {
            debug!(unit = %self.unit, "{message}");
        }
    }
}

/// How a render call ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Completed { output: PathBuf, pages: usize },
    /// Cancellation was observed at the checkpoint before `stage`. Nothing was written.
    Interrupted { stage: Stage },
}

/// The seam between the dispatcher and the actual JSON → PDF transformation.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, job: &RenderJob<'_>, ctx: &RenderContext<'_>) -> Result<RenderOutcome, RenderError>;
}
