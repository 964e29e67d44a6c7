//! Data types for the upload engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use covferry_transport::DEFAULT_CHUNK_SIZE;

/// One (local file, remote item path) pair to transfer.
///
/// Immutable once enumerated; `item_path` uses `/` separators
/// regardless of host path conventions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadUnit {
    /// Absolute path of the local file.
    pub source: PathBuf,
    /// Path of the item within the container.
    pub item_path: String,
    /// File size in bytes at enumeration time.
    pub size: u64,
}

/// Remote destination the uploader writes into.
#[derive(Debug, Clone)]
pub struct ContainerDestination {
    /// Remote container identifier.
    pub container_id: i64,
    /// Scope (project or collection) the container belongs to.
    pub scope_id: String,
}

/// Tuning knobs for one uploader.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Chunk size handed to the transport.
    pub chunk_size: usize,
    /// Upper bound on concurrent upload workers, so the remote
    /// endpoint is not overwhelmed.
    pub max_workers: usize,
    /// Explicit worker count; `None` derives one from available
    /// parallelism.
    pub workers: Option<usize>,
    /// Total wait between the first pass and the retry pass.
    pub retry_delay: Duration,
    /// Countdown step within the retry wait; cancellation is checked
    /// at each step.
    pub retry_delay_step: Duration,
    /// Progress reporting interval.
    pub progress_interval: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: 8,
            workers: None,
            retry_delay: Duration::from_secs(60),
            retry_delay_step: Duration::from_secs(5),
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// Result of a successful [`copy_to_container`] call.
///
/// [`copy_to_container`]: crate::ContainerUploader::copy_to_container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Files uploaded; a retried file counts once.
    pub files: usize,
    /// Bytes transferred across both passes.
    pub bytes: u64,
    /// Wall-clock duration of the whole operation in milliseconds.
    pub elapsed_ms: u64,
}
