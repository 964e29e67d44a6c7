//! Bulk upload of a directory tree into a remote object container.
//!
//! Built for CI artifact publishing: thousands of small files, a flaky
//! network, and a hard wall-clock budget. The engine enumerates the
//! source tree, drains a shared queue with a bounded worker pool, and
//! recovers transient failures with a single delayed retry pass.
//!
//! # Pipeline
//!
//! 1. **Enumerate** — walk the source directory into upload units
//! 2. **Pass 1** — upload everything with a bounded worker pool
//! 3. **Delay** — optional cancelable countdown before the retry
//! 4. **Pass 2** — re-upload only the files that failed
//! 5. Fail hard if anything still failed
//!
//! The remote protocol is injected as a
//! [`ContainerTransport`](covferry_transport::ContainerTransport);
//! this crate never talks to the network itself.

pub mod coordinator;
pub mod enumerate;
pub mod error;
pub mod events;
mod pass;
pub mod progress;
pub mod types;

// Re-export primary types for convenience.
pub use coordinator::ContainerUploader;
pub use enumerate::enumerate_units;
pub use error::UploadError;
pub use events::EventBuffers;
pub use types::{ContainerDestination, UploadOptions, UploadSummary, UploadUnit};
