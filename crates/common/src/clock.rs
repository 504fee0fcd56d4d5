//! Clock and pacing utilities for long-running export work.
//!
//! Every export run is anchored to a monotonic start instant. This module
//! provides:
//! - Elapsed time and remaining-time estimation
//! - Throttling of progress emissions to fixed percentage steps

use std::time::Instant;

/// A run clock that provides monotonic elapsed time relative to the
/// moment an export started.
#[derive(Debug, Clone)]
pub struct ExportClock {
    /// The instant the run started.
    started: Instant,

    /// Wall-clock time at start (RFC 3339 string).
    started_wall: String,
}

impl ExportClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Wall-clock time at run start.
    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }

    /// Estimated seconds remaining given the completed fraction `[0, 1]`.
    ///
    /// Returns `None` until some work has completed.
    pub fn eta_secs(&self, fraction_done: f64) -> Option<f64> {
        estimate_remaining(self.elapsed_secs(), fraction_done)
    }
}

/// Linear remaining-time estimate from elapsed time and completed fraction.
pub fn estimate_remaining(elapsed_secs: f64, fraction_done: f64) -> Option<f64> {
    if fraction_done.is_nan() || fraction_done <= 0.0 {
        return None;
    }
    let fraction = fraction_done.min(1.0);
    Some(((elapsed_secs / fraction) - elapsed_secs).max(0.0))
}

/// Gate that lets a progress value through only after it has moved by at
/// least `step` percent since the last emission.
#[derive(Debug)]
pub struct ProgressThrottle {
    step_percent: f64,
    last_emitted: Option<f64>,
}

impl ProgressThrottle {
    /// Create a throttle with the given step (in percent).
    pub fn new(step_percent: f64) -> Self {
        Self {
            step_percent: step_percent.max(0.0),
            last_emitted: None,
        }
    }

    /// Check whether `percent` should be emitted. Returns true and records
    /// it if so. The first call and the final 100% always pass.
    pub fn should_emit(&mut self, percent: f64) -> bool {
        match self.last_emitted {
            None => {
                self.last_emitted = Some(percent);
                true
            }
            Some(last) if percent >= 100.0 && last < 100.0 => {
                self.last_emitted = Some(percent);
                true
            }
            Some(last) if percent >= last + self.step_percent => {
                self.last_emitted = Some(percent);
                true
            }
            _ => false,
        }
    }

    /// Configured step in percent.
    pub fn step_percent(&self) -> f64 {
        self.step_percent
    }
}
