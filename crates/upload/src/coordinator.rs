//! Upload coordination: enumerate, pass 1, delayed retry, pass 2.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use covferry_transport::ContainerTransport;

use crate::enumerate::enumerate_units;
use crate::error::UploadError;
use crate::pass::run_pass;
use crate::types::{ContainerDestination, UploadOptions, UploadSummary};

/// Uploads directory trees into one remote container.
pub struct ContainerUploader {
    transport: Arc<dyn ContainerTransport>,
    destination: ContainerDestination,
    options: UploadOptions,
}

impl ContainerUploader {
    /// Creates an uploader writing into `destination`.
    pub fn new(
        transport: Arc<dyn ContainerTransport>,
        destination: ContainerDestination,
        options: UploadOptions,
    ) -> Self {
        Self {
            transport,
            destination,
            options,
        }
    }

    /// Uploads every file under `source_dir` to
    /// `container_path/<relative path>` in the container.
    ///
    /// Runs one pass over all files; transiently failed files get a
    /// single retry pass, preceded by a cancelable countdown when
    /// `enable_retry_delay` is set. A directory with no files succeeds
    /// immediately without running a pass.
    ///
    /// Returns a summary on success, [`UploadError::UploadFailed`]
    /// when files still fail after the retry pass, and
    /// [`UploadError::Cancelled`] as soon as the token is observed at
    /// any suspension point.
    pub async fn copy_to_container(
        &self,
        source_dir: &Path,
        container_path: &str,
        cancel: CancellationToken,
        enable_retry_delay: bool,
    ) -> Result<UploadSummary, UploadError> {
        let started = Instant::now();

        let units = enumerate_units(source_dir, container_path)?;
        if units.is_empty() {
            info!(dir = %source_dir.display(), "no files to upload");
            return Ok(UploadSummary::default());
        }

        let total_files = units.len();
        let total_bytes: u64 = units.iter().map(|u| u.size).sum();
        info!(
            files = total_files,
            bytes = total_bytes,
            container = self.destination.container_id,
            path = container_path,
            "uploading directory to container"
        );

        let first = run_pass(
            units,
            Arc::clone(&self.transport),
            &self.destination,
            &self.options,
            &cancel,
        )
        .await?;
        let mut bytes = first.bytes;

        if !first.failed.is_empty() {
            info!(failed = first.failed.len(), "files failed to upload, retrying once");
            for unit in &first.failed {
                debug!(item = %unit.item_path, "failed in first pass");
            }

            if enable_retry_delay {
                self.retry_delay(first.failed.len(), &cancel).await?;
            }

            let second = run_pass(
                first.failed,
                Arc::clone(&self.transport),
                &self.destination,
                &self.options,
                &cancel,
            )
            .await?;
            bytes += second.bytes;

            if !second.failed.is_empty() {
                error!(
                    failed = second.failed.len(),
                    "files still failing after retry pass"
                );
                return Err(UploadError::UploadFailed {
                    files: second.failed.len(),
                });
            }
        }

        let summary = UploadSummary {
            files: total_files,
            bytes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            files = summary.files,
            bytes = summary.bytes,
            elapsed_ms = summary.elapsed_ms,
            "container upload complete"
        );
        Ok(summary)
    }

    /// Waits out the configured delay in small cancelable steps,
    /// logging the remaining time at each step.
    async fn retry_delay(
        &self,
        failed: usize,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let mut remaining = self.options.retry_delay;
        while !remaining.is_zero() {
            info!(
                failed,
                remaining_secs = remaining.as_secs(),
                "waiting before retry pass"
            );
            let step = remaining.min(self.options.retry_delay_step);
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(step) => {}
            }
            remaining -= step;
        }
        Ok(())
    }
}
