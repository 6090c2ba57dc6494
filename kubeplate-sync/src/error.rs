//! Error types for kubeplate-sync.

use std::path::PathBuf;

use thiserror::Error;

use kubeplate_renderer::RenderError;

/// Errors from building or processing a template unit.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The template source file could not be read.
    #[error("can't read template {path}: {source}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Compiling or rendering failed; nothing was written.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Persisting the output failed; the previous output is intact.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Whether rendering succeeded and only persisting the result failed.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, SyncError::Io { .. })
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
