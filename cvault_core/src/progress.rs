//! Progress delivery: a bounded, best-effort, single-subscriber channel.
//!
//! The packer must never block on a slow consumer, so progress events are
//! dropped on overflow rather than backpressuring the session — progress is
//! advisory.

use tokio::sync::mpsc;

/// Session lifecycle phase, emitted to the progress sink in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Scanning,
    Encrypting,
    Uploading,
    UpdatingCatalog,
    UploadingCatalog,
    Complete,
    Cancelled,
    Failed,
}

/// One progress update. `current_file` is `None` when a phase has no
/// natural per-file cursor (e.g. `Starting`, `UpdatingCatalog`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current_file: Option<String>,
    pub total_files: u64,
    pub done_files: u64,
    pub total_bytes: u64,
    pub done_bytes: u64,
}

impl ProgressEvent {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            if self.total_files == 0 {
                0.0
            } else {
                (self.done_files as f64 / self.total_files as f64) * 100.0
            }
        } else {
            (self.done_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    pub fn phase_only(phase: Phase) -> Self {
        Self {
            phase,
            current_file: None,
            total_files: 0,
            done_files: 0,
            total_bytes: 0,
            done_bytes: 0,
        }
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded progress channel. The sender drops events rather than
/// awaiting a full channel.
pub fn channel() -> (ProgressSink, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (ProgressSink(tx), rx)
}

#[derive(Clone)]
pub struct ProgressSink(mpsc::Sender<ProgressEvent>);

impl ProgressSink {
    pub fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.0.try_send(event) {
            tracing::trace!("dropping progress event: {e}");
        }
    }
}
