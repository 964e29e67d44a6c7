//! Pass-lifetime progress reporting.
//!
//! A background task runs for the duration of one pass. On every tick
//! it drains the buffered chunk events and logs one line per event;
//! when a tick drains nothing, every other such tick logs the
//! aggregate processed/total line instead, with the current transfer
//! rate appended when known.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::events::EventBuffers;

// ---------------------------------------------------------------------------
// RateWindow
// ---------------------------------------------------------------------------

/// Default sliding window for rate calculation.
const RATE_WINDOW: Duration = Duration::from_secs(10);

/// Maximum retained rate samples.
const MAX_RATE_SAMPLES: usize = 256;

struct RateSample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer rate over a sliding window of completed files.
pub struct RateWindow {
    inner: Mutex<RateInner>,
}

struct RateInner {
    samples: Vec<RateSample>,
    window: Duration,
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(RATE_WINDOW)
    }
}

impl RateWindow {
    /// Creates a window spanning `window` of wall-clock time.
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Mutex::new(RateInner {
                samples: Vec::new(),
                window,
            }),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.samples.push(RateSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        let cutoff = now - inner.window;
        inner.samples.retain(|s| s.timestamp >= cutoff);

        if inner.samples.len() > MAX_RATE_SAMPLES {
            let excess = inner.samples.len() - MAX_RATE_SAMPLES;
            inner.samples.drain(..excess);
        }
    }

    /// Average rate in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.samples.len() < 2 {
            return 0.0;
        }

        let first = &inner.samples[0];
        let last = &inner.samples[inner.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total: u64 = inner.samples.iter().map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }
}

/// Formats a byte rate for log output.
fn fmt_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.1} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.1} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}

// ---------------------------------------------------------------------------
// Aggregator task
// ---------------------------------------------------------------------------

/// Handle to a running aggregator task.
pub(crate) struct AggregatorHandle {
    done: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Signals completion and waits for the final log flush.
    pub(crate) async fn finish(mut self) {
        drop(self.done.take());
        let _ = self.task.await;
    }
}

/// Spawns the per-pass progress reporter.
///
/// The task exits on the completion latch or on cancellation; the
/// pass awaits [`AggregatorHandle::finish`] before computing results
/// so output is flushed deterministically.
pub(crate) fn spawn_aggregator(
    buffers: Arc<EventBuffers>,
    processed: Arc<AtomicUsize>,
    total: usize,
    rate: Arc<RateWindow>,
    interval: Duration,
    cancel: CancellationToken,
) -> AggregatorHandle {
    let (done_tx, mut done_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        let mut quiet_ticks = 0u32;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let events = buffers.drain_progress();
                    if events.is_empty() {
                        quiet_ticks += 1;
                        if quiet_ticks % 2 == 0 {
                            log_aggregate(&processed, total, &rate);
                        }
                    } else {
                        quiet_ticks = 0;
                        for (path, p) in events {
                            info!(
                                item = %path,
                                "chunk {} of {}", p.current_chunk, p.total_chunks
                            );
                        }
                    }
                }
                _ = &mut done_rx => {
                    // Flush whatever arrived since the last tick.
                    for (path, p) in buffers.drain_progress() {
                        info!(
                            item = %path,
                            "chunk {} of {}", p.current_chunk, p.total_chunks
                        );
                    }
                    break;
                }
                _ = cancel.cancelled() => break,
            }
        }
    });

    AggregatorHandle {
        done: Some(done_tx),
        task,
    }
}

fn log_aggregate(processed: &AtomicUsize, total: usize, rate: &RateWindow) {
    let done = processed.load(Ordering::Relaxed);
    let percent = if total > 0 { done * 100 / total } else { 100 };
    let bytes_per_sec = rate.bytes_per_second();
    if bytes_per_sec > 0.0 {
        info!(
            "processed {done} of {total} files ({percent}%), {}",
            fmt_rate(bytes_per_sec)
        );
    } else {
        info!("processed {done} of {total} files ({percent}%)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_window_no_samples() {
        let rate = RateWindow::default();
        assert_eq!(rate.bytes_per_second(), 0.0);
    }

    #[test]
    fn rate_window_single_sample() {
        let rate = RateWindow::default();
        rate.add_sample(4096);
        // Need at least 2 samples.
        assert_eq!(rate.bytes_per_second(), 0.0);
    }

    #[test]
    fn rate_window_multiple_samples() {
        let rate = RateWindow::new(Duration::from_secs(30));
        rate.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        rate.add_sample(500);

        // Timing is imprecise under load, just check the rate is positive.
        assert!(rate.bytes_per_second() > 0.0);
    }

    #[test]
    fn rate_window_caps_samples() {
        let rate = RateWindow::new(Duration::from_secs(60));
        for _ in 0..(MAX_RATE_SAMPLES + 100) {
            rate.add_sample(1);
        }
        let inner = rate.inner.lock().unwrap();
        assert!(inner.samples.len() <= MAX_RATE_SAMPLES);
    }

    #[test]
    fn fmt_rate_units() {
        assert_eq!(fmt_rate(512.0), "512 B/s");
        assert_eq!(fmt_rate(2048.0), "2.0 KiB/s");
        assert_eq!(fmt_rate(3.5 * 1024.0 * 1024.0), "3.5 MiB/s");
    }

    #[tokio::test]
    async fn aggregator_exits_on_finish() {
        let handle = spawn_aggregator(
            Arc::new(EventBuffers::new()),
            Arc::new(AtomicUsize::new(0)),
            10,
            Arc::new(RateWindow::default()),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        handle.finish().await;
    }

    #[tokio::test]
    async fn finish_flushes_pending_progress() {
        use covferry_transport::UploadEvents;

        let buffers = Arc::new(EventBuffers::new());
        buffers.progress("coverage/a.html", 2, 4);

        let handle = spawn_aggregator(
            Arc::clone(&buffers),
            Arc::new(AtomicUsize::new(0)),
            10,
            Arc::new(RateWindow::default()),
            Duration::from_secs(3600),
            CancellationToken::new(),
        );
        handle.finish().await;

        // The latch drain consumed the event the ticker never saw.
        assert!(buffers.drain_progress().is_empty());
    }

    #[tokio::test]
    async fn aggregator_exits_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_aggregator(
            Arc::new(EventBuffers::new()),
            Arc::new(AtomicUsize::new(0)),
            10,
            Arc::new(RateWindow::default()),
            Duration::from_secs(3600),
            cancel.clone(),
        );
        cancel.cancel();
        let _ = handle.task.await;
    }
}
