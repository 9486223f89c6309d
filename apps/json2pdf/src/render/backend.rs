//! Default render backend: load → analyze → layout → encode → write.
//!
//! Every stage boundary is a cancellation checkpoint. The PDF is written to a
//! temp file next to its destination and only persisted after the last
//! checkpoint passes, so an interrupted unit never leaves a partial file behind.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::errors::RenderError;
use crate::models::SourceDocument;
use crate::render::analyze::analyze;
use crate::render::layout::{compose, default_page_config, effective_personal, PageConfig};
use crate::render::pdf;
use crate::render::{RenderBackend, RenderContext, RenderJob, RenderOutcome, Stage};

pub struct DocumentBackend {
    page: PageConfig,
}

impl DocumentBackend {
    pub fn new() -> Self {
        Self::with_page_config(default_page_config())
    }

    pub fn with_page_config(page: PageConfig) -> Self {
        Self { page }
    }
}

impl Default for DocumentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for DocumentBackend {
    fn name(&self) -> &str {
        "document"
    }

    fn render(&self, job: &RenderJob<'_>, ctx: &RenderContext<'_>) -> Result<RenderOutcome, RenderError> {
        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Load });
        }
        ctx.enter(Stage::Load);
        let raw = fs::read_to_string(job.source)?;
        let source: SourceDocument =
            serde_json::from_str(&raw).map_err(|source| RenderError::Json {
                path: job.source.to_path_buf(),
                source,
            })?;

        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Analyze });
        }
        ctx.enter(Stage::Analyze);
        let base_dir = job.source.parent().unwrap_or_else(|| Path::new("."));
        let document = analyze(source, job.kind, base_dir)?;
        ctx.trace(&format!("analyzed {} section(s)", document.sections.len()));

        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Layout });
        }
        ctx.enter(Stage::Layout);
        let pages = compose(&document, job.kind, job.options, &self.page);
        ctx.trace(&format!("laid out {} page(s)", pages.len()));

        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Encode });
        }
        ctx.enter(Stage::Encode);
        let title = match effective_personal(&document, job.options).name {
            Some(name) => format!("{name} - {}", job.kind.title()),
            None => job.kind.title().to_string(),
        };
        let bytes = pdf::encode(&pages, &title, &self.page);

        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Write });
        }
        ctx.enter(Stage::Write);
        let directory = match job.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        fs::create_dir_all(&directory)?;
        let mut staged = NamedTempFile::new_in(&directory)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;

        // Last safe point: dropping `staged` removes the temp file.
        if ctx.should_cancel() {
            return Ok(RenderOutcome::Interrupted { stage: Stage::Write });
        }
        staged
            .persist(job.output)
            .map_err(|err| RenderError::Io(err.error))?;
        ctx.trace(&format!("wrote {} byte(s) to {}", bytes.len(), job.output.display()));

        Ok(RenderOutcome::Completed {
            output: job.output.to_path_buf(),
            pages: pages.len(),
        })
    }
}
