//! Progress reporting across concurrent workers.
//!
//! Each worker owns a channel sender and reports only its own frames;
//! a single aggregator task folds the streams into overall counts.
//! No shared mutable counters.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// One worker's progress snapshot.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Identifier of the reporting unit ("render", "segment 2", "row 7").
    pub job: String,

    /// Frames completed by this unit so far.
    pub frames_done: u32,

    /// Total frames assigned to this unit.
    pub total: u32,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Callback invoked with `(frames_done, total_frames)` across all units.
pub type ProgressCallback = Box<dyn Fn(u32, u32) + Send>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Aggregates per-worker progress events into overall counts.
pub struct ProgressReporter {
    task: tokio::task::JoinHandle<()>,
}

impl ProgressReporter {
    /// Spawn the aggregator over `rx`, invoking `callback` with overall
    /// counts whenever any worker advances. `grand_total` is the frame
    /// count of the whole run.
    pub fn spawn(mut rx: ProgressReceiver, grand_total: u32, callback: ProgressCallback) -> Self {
        let task = tokio::spawn(async move {
            let mut per_job: HashMap<String, u32> = HashMap::new();
            while let Some(event) = rx.recv().await {
                per_job.insert(event.job.clone(), event.frames_done);
                let done: u32 = per_job.values().sum();
                callback(done.min(grand_total), grand_total);
            }
        });
        Self { task }
    }

    /// Wait for the aggregator to drain after all senders are dropped.
    pub async fn finish(self) {
        self.task.await.ok();
    }
}
