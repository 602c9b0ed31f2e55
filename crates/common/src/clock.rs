//! Run clock for elapsed-time reporting.
//!
//! Every render and batch run is anchored to a monotonic epoch captured
//! when the run starts. The wall-clock time at the epoch is kept for
//! summaries and logs.

use std::time::Instant;

/// A run clock that provides monotonic elapsed time relative to a fixed
/// epoch (the moment the run started).
#[derive(Debug, Clone)]
pub struct RunClock {
    /// The instant the run started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl RunClock {
    /// Create a new run clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Milliseconds elapsed since the run started.
    pub fn elapsed_ms(&self) -> u128 {
        self.epoch.elapsed().as_millis()
    }

    /// Wall-clock time at run start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let clock = RunClock::start();
        let first = clock.elapsed_secs();
        let second = clock.elapsed_secs();
        assert!(second >= first);
    }

    #[test]
    fn test_epoch_wall_is_rfc3339() {
        let clock = RunClock::start();
        assert!(chrono::DateTime::parse_from_rfc3339(clock.epoch_wall()).is_ok());
    }
}
