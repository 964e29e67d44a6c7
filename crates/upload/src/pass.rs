//! One upload pass: a bounded worker pool draining a shared queue.
//!
//! All workers perform the identical operation and differ only in
//! which file they happen to dequeue; upload order across files is
//! non-deterministic. The queue is the only mutable state shared
//! between workers, and each file is delivered to exactly one worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use covferry_transport::{ContainerTransport, TransportError, UploadSpec};

use crate::error::UploadError;
use crate::events::EventBuffers;
use crate::progress::{RateWindow, spawn_aggregator};
use crate::types::{ContainerDestination, UploadOptions, UploadUnit};

/// Outcome of one pass.
pub(crate) struct PassResult {
    /// Units that failed transiently and are eligible for retry.
    pub failed: Vec<UploadUnit>,
    /// Bytes uploaded during this pass.
    pub bytes: u64,
}

/// Derives the worker count for a pass: half the available
/// parallelism, at least one, capped, and never more than the number
/// of queued files.
pub(crate) fn worker_count(files: usize, options: &UploadOptions) -> usize {
    let derived = options.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(1)
    });
    derived
        .max(1)
        .min(options.max_workers.max(1))
        .min(files.max(1))
}

/// Runs one pass over `units`, returning the transiently failed
/// subset.
///
/// The queue is fully drained (or abandoned on cancellation) and the
/// progress reporter joined before the result is computed. A worker
/// error — cancellation or a fatal local I/O failure — wins over the
/// per-worker failure lists.
pub(crate) async fn run_pass(
    units: Vec<UploadUnit>,
    transport: Arc<dyn ContainerTransport>,
    destination: &ContainerDestination,
    options: &UploadOptions,
    cancel: &CancellationToken,
) -> Result<PassResult, UploadError> {
    let total = units.len();
    let workers = worker_count(total, options);
    debug!(files = total, workers, "starting upload pass");

    let queue = Arc::new(Mutex::new(VecDeque::from(units)));
    let buffers = Arc::new(EventBuffers::new());
    let processed = Arc::new(AtomicUsize::new(0));
    let bytes = Arc::new(AtomicU64::new(0));
    let rate = Arc::new(RateWindow::default());

    let aggregator = spawn_aggregator(
        Arc::clone(&buffers),
        Arc::clone(&processed),
        total,
        Arc::clone(&rate),
        options.progress_interval,
        cancel.clone(),
    );

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            transport: Arc::clone(&transport),
            buffers: Arc::clone(&buffers),
            processed: Arc::clone(&processed),
            bytes: Arc::clone(&bytes),
            rate: Arc::clone(&rate),
            destination: destination.clone(),
            chunk_size: options.chunk_size,
            cancel: cancel.clone(),
        };
        handles.push(tokio::spawn(upload_worker(ctx)));
    }

    // Join every worker before deciding the pass outcome.
    let mut failed = Vec::new();
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(mut worker_failed)) => failed.append(&mut worker_failed),
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(UploadError::Join(e));
                }
            }
        }
    }

    aggregator.finish().await;

    if let Some(e) = first_error {
        return Err(e);
    }
    Ok(PassResult {
        failed,
        bytes: bytes.load(Ordering::Relaxed),
    })
}

struct WorkerContext {
    queue: Arc<Mutex<VecDeque<UploadUnit>>>,
    transport: Arc<dyn ContainerTransport>,
    buffers: Arc<EventBuffers>,
    processed: Arc<AtomicUsize>,
    bytes: Arc<AtomicU64>,
    rate: Arc<RateWindow>,
    destination: ContainerDestination,
    chunk_size: usize,
    cancel: CancellationToken,
}

/// One worker: dequeue, open, upload, classify, repeat until the
/// queue is empty.
async fn upload_worker(ctx: WorkerContext) -> Result<Vec<UploadUnit>, UploadError> {
    let mut failed = Vec::new();

    loop {
        // Stop dequeuing as soon as cancellation is observed.
        if ctx.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let unit = { ctx.queue.lock().unwrap().pop_front() };
        let Some(unit) = unit else { break };

        // An unopenable source file will not become openable by
        // waiting, so this aborts the whole operation instead of
        // entering the retry pass.
        let source = match File::open(&unit.source).await {
            Ok(file) => file,
            Err(e) => {
                error!(
                    file = %unit.source.display(),
                    error = %e,
                    "cannot open source file"
                );
                return Err(UploadError::Io(e));
            }
        };

        let spec = UploadSpec {
            container_id: ctx.destination.container_id,
            item_path: &unit.item_path,
            scope_id: &ctx.destination.scope_id,
            chunk_size: ctx.chunk_size,
        };
        let result = ctx
            .transport
            .upload_file(spec, source, &*ctx.buffers, ctx.cancel.clone())
            .await;

        match result {
            Ok(status) if status.is_created() => {
                ctx.processed.fetch_add(1, Ordering::Relaxed);
                ctx.bytes.fetch_add(unit.size, Ordering::Relaxed);
                ctx.rate.add_sample(unit.size);
                flush_trace(&ctx.buffers, &unit.item_path);
                debug!(item = %unit.item_path, bytes = unit.size, "uploaded");
            }
            Ok(status) => {
                warn!(item = %unit.item_path, ?status, "upload rejected, queued for retry");
                flush_trace(&ctx.buffers, &unit.item_path);
                failed.push(unit);
            }
            Err(TransportError::Cancelled) if ctx.cancel.is_cancelled() => {
                return Err(UploadError::Cancelled);
            }
            Err(e) => {
                warn!(item = %unit.item_path, error = %e, "upload failed, queued for retry");
                flush_trace(&ctx.buffers, &unit.item_path);
                failed.push(unit);
            }
        }
    }

    Ok(failed)
}

fn flush_trace(buffers: &EventBuffers, item_path: &str) {
    for line in buffers.take_trace(item_path) {
        debug!(item = %item_path, "{line}");
    }
}
