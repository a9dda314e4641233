//! Clock utilities for timing analysis and removal runs.
//!
//! A run is anchored to a monotonic epoch taken when it starts, alongside
//! the wall-clock time for reports.

use std::time::Instant;

/// A clock that provides monotonic elapsed time relative to a fixed epoch.
#[derive(Debug, Clone)]
pub struct RunClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RunClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get milliseconds elapsed since the run started.
    pub fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Get seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at run start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Format seconds the way filter-graph enable expressions expect them.
pub fn format_filter_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}
