//! Transport seam for chunked uploads into a remote object container.
//!
//! The engine in `covferry-upload` is decoupled from the remote API:
//! the host provides a [`ContainerTransport`] implementation that
//! performs one chunked upload attempt and reports per-chunk progress
//! and free-text trace lines through [`UploadEvents`]. Using a trait
//! keeps the engine independent of the wire protocol and testable
//! with mocks.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

/// Default chunk size: 4 MiB.
///
/// Larger chunks reduce per-chunk overhead (ACKs, syscalls) for the
/// many-small-files workloads this engine is built for.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload cancelled")]
    Cancelled,

    #[error("remote error: {0}")]
    Remote(String),
}

/// Status reported by the remote container service for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// The item was stored.
    Created,
    /// The service refused the item because it already exists.
    Conflict,
    /// Any other status code.
    Other(u16),
}

impl UploadStatus {
    /// Returns `true` for the one status that counts as success.
    pub fn is_created(self) -> bool {
        matches!(self, UploadStatus::Created)
    }
}

/// Parameters for one upload attempt.
#[derive(Debug, Clone, Copy)]
pub struct UploadSpec<'a> {
    /// Remote container identifier.
    pub container_id: i64,
    /// Item path within the container (`/`-separated).
    pub item_path: &'a str,
    /// Scope (project or collection) the container belongs to.
    pub scope_id: &'a str,
    /// Chunk size in bytes for the chunked protocol.
    pub chunk_size: usize,
}

/// Callbacks a transport invokes while an attempt is in flight.
///
/// Events are keyed by item path so the caller can buffer them per
/// file; there is no ordering guarantee across files.
pub trait UploadEvents: Send + Sync {
    /// One chunk of `item_path` was transferred.
    fn progress(&self, item_path: &str, current_chunk: u32, total_chunks: u32);

    /// Free-text diagnostic line for `item_path`.
    fn trace(&self, item_path: &str, message: &str);
}

/// Abstract chunked upload into a remote object container.
pub trait ContainerTransport: Send + Sync {
    /// Performs one chunked upload attempt of `source` to
    /// `spec.item_path`.
    ///
    /// Implementations must observe `cancel` at chunk boundaries and
    /// return [`TransportError::Cancelled`] once it fires. Any status
    /// other than [`UploadStatus::Created`] leaves the item in an
    /// unknown remote state; callers decide whether to retry.
    fn upload_file<'a>(
        &'a self,
        spec: UploadSpec<'a>,
        source: File,
        events: &'a dyn UploadEvents,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<UploadStatus, TransportError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_is_the_only_success() {
        assert!(UploadStatus::Created.is_created());
        assert!(!UploadStatus::Conflict.is_created());
        assert!(!UploadStatus::Other(500).is_created());
    }

    #[test]
    fn status_json_roundtrip() {
        for status in [
            UploadStatus::Created,
            UploadStatus::Conflict,
            UploadStatus::Other(503),
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let parsed: UploadStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn transport_error_from_io() {
        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
