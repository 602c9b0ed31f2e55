//! Cooperative cancellation flag shared across concurrent jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared flag that workers observe at their suspension points.
///
/// Raising the flag never interrupts a worker mid-operation; each job
/// checks it between frames and inside bounded waits, then performs its
/// own teardown before returning a cancellation error.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every job holding a clone of this flag.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}
