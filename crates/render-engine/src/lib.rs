//! Framecast Render Engine
//!
//! The orchestration layer: one render job couples a frame source to an
//! encoder sink for a contiguous frame range; the parallel coordinator
//! splits one render across segment workers and merges losslessly; the
//! batch coordinator runs independent per-row jobs under a bounded
//! pool. Failures are isolated per the coordinator's policy and every
//! exit path releases its session and subprocess.

pub mod batch;
pub mod data;
pub mod job;
pub mod parallel;
pub mod progress;

pub use batch::{run_batch, shared_base, BatchOptions, BatchSummary, RowOutcome};
pub use data::{parse_rows_file, Row};
pub use job::{render_still, run_render_job, JobContext, RenderOutcome};
pub use parallel::{plan_segments, render_video, Segment};
pub use progress::{
    progress_channel, ProgressCallback, ProgressEvent, ProgressReporter, ProgressSender,
};
