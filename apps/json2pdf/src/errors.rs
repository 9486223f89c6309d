use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unusable user input.
///
/// Option errors surface while the configuration is built and abort startup.
/// Source errors surface per compilation unit and never affect sibling units.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("source is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("source file is not readable: {}: {source}", path.display())]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid value for --{flag}: {message}")]
    InvalidOption { flag: &'static str, message: String },

    #[error("conflicting options: {0}")]
    Conflict(String),
}

/// Failure inside the render backend while converting one document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid document ({} problem(s)): {}", .0.len(), .0.join("; "))]
    Semantic(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while checking for or installing a newer backend. Always fatal.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update requested but no release manifest URL is configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("release server returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid release manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("invalid version identifier: {0:?}")]
    InvalidVersion(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("update interrupted before it finished")]
    Interrupted,
}

/// Error detail captured on a compilation unit that ended in `Failed`.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl UnitError {
    /// Short machine-friendly category, used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            UnitError::Configuration(_) => "CONFIGURATION_ERROR",
            UnitError::Render(_) => "RENDER_ERROR",
            UnitError::Panicked(_) => "WORKER_PANIC",
        }
    }
}
