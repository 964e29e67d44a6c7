//! Upload engine error types.

use std::path::PathBuf;

/// Errors produced by the container upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("source directory not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("upload failed for {files} file(s) after retry")]
    UploadFailed { files: usize },

    #[error("upload worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
