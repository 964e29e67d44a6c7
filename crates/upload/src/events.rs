//! Per-file event buffers shared between the transport and one pass.
//!
//! The transport reports chunk progress and free-text trace lines
//! keyed by item path. Buffers belong to a single pass: progress is
//! drained by the aggregator on its tick, trace is drained by the
//! owning worker when the file finishes, and whatever is left is
//! dropped with the pass.

use std::collections::HashMap;
use std::sync::Mutex;

use covferry_transport::UploadEvents;

/// Buffered chunk-progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub current_chunk: u32,
    pub total_chunks: u32,
}

/// Pass-owned buffers for transport events.
#[derive(Default)]
pub struct EventBuffers {
    progress: Mutex<HashMap<String, Vec<ChunkProgress>>>,
    trace: Mutex<HashMap<String, Vec<String>>>,
}

impl EventBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every buffered progress event, keyed by item path.
    pub fn drain_progress(&self) -> Vec<(String, ChunkProgress)> {
        let mut map = self.progress.lock().unwrap();
        let mut out = Vec::new();
        for (path, entries) in map.drain() {
            for entry in entries {
                out.push((path.clone(), entry));
            }
        }
        out
    }

    /// Takes the buffered trace lines for one item path.
    pub fn take_trace(&self, item_path: &str) -> Vec<String> {
        let mut map = self.trace.lock().unwrap();
        map.remove(item_path).unwrap_or_default()
    }
}

impl UploadEvents for EventBuffers {
    fn progress(&self, item_path: &str, current_chunk: u32, total_chunks: u32) {
        let mut map = self.progress.lock().unwrap();
        map.entry(item_path.to_string()).or_default().push(ChunkProgress {
            current_chunk,
            total_chunks,
        });
    }

    fn trace(&self, item_path: &str, message: &str) {
        let mut map = self.trace.lock().unwrap();
        map.entry(item_path.to_string())
            .or_default()
            .push(message.to_string());
    }
}
