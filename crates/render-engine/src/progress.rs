//! Export state machine and progress reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qcut_common::clock::{ExportClock, ProgressThrottle};
use serde::Serialize;
use tokio::sync::mpsc;

/// Where an export run is.
///
/// ```text
/// idle → analyzing → prerendering → compositing → encoding → cleanup → complete
///            │             │              │            │          ├──→ error
///            └─────────────┴──────────────┴────────────┴→ cleanup └──→ cancelled
/// ```
///
/// `prerendering` is skipped when the plan has no dynamic layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    Idle,
    Analyzing,
    Prerendering,
    Compositing,
    Encoding,
    Cleanup,
    Complete,
    Error,
    Cancelled,
}

impl ExportState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, Prerendering | Compositing | Cleanup)
                | (Prerendering, Compositing | Cleanup)
                | (Compositing, Encoding | Cleanup)
                | (Encoding, Cleanup)
                | (Cleanup, Complete | Error | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportState::Complete | ExportState::Error | ExportState::Cancelled
        )
    }

    /// Overall-progress band `[start, end]` in percent.
    pub fn overall_range(self, prerender_skipped: bool) -> (f64, f64) {
        match self {
            ExportState::Idle => (0.0, 0.0),
            ExportState::Analyzing => (0.0, 5.0),
            ExportState::Prerendering => (5.0, 40.0),
            ExportState::Compositing if prerender_skipped => (5.0, 90.0),
            ExportState::Compositing => (40.0, 90.0),
            ExportState::Encoding => (90.0, 98.0),
            ExportState::Cleanup => (98.0, 100.0),
            ExportState::Complete => (100.0, 100.0),
            ExportState::Error | ExportState::Cancelled => (100.0, 100.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportState::Idle => "idle",
            ExportState::Analyzing => "analyzing",
            ExportState::Prerendering => "prerendering",
            ExportState::Compositing => "compositing",
            ExportState::Encoding => "encoding",
            ExportState::Cleanup => "cleanup",
            ExportState::Complete => "complete",
            ExportState::Error => "error",
            ExportState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    pub phase: ExportState,
    /// Whole-run progress `[0, 100]`.
    pub overall_progress: f64,
    /// Progress inside `phase`, `[0, 100]`.
    pub phase_progress: f64,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_completed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    /// Seconds, linear estimate from elapsed time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<f64>,
}

/// Cooperative cancellation flag shared between the caller and the run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight units finish; no new ones start.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Export cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sends progress events and enforces state transitions.
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<ExportProgress>,
    state: ExportState,
    prerender_skipped: bool,
    step_percent: f64,
    throttle: ProgressThrottle,
    clock: ExportClock,
    last_overall: f64,
    total_frames: Option<u64>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ExportProgress>, step_percent: f64) -> Self {
        Self {
            tx,
            state: ExportState::Idle,
            prerender_skipped: false,
            step_percent,
            throttle: ProgressThrottle::new(step_percent),
            clock: ExportClock::start(),
            last_overall: 0.0,
            total_frames: None,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    pub fn set_prerender_skipped(&mut self, skipped: bool) {
        self.prerender_skipped = skipped;
    }

    pub fn set_total_frames(&mut self, total: u64) {
        self.total_frames = Some(total);
    }

    /// Move to `next` and emit its entry event. Invalid transitions are
    /// refused and logged.
    pub fn enter(&mut self, next: ExportState, message: impl Into<String>) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "Invalid export state transition");
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "Export state transition");
        self.state = next;
        self.throttle = ProgressThrottle::new(self.step_percent);

        let (start, _) = next.overall_range(self.prerender_skipped);
        let overall = if next.is_terminal() && next != ExportState::Complete {
            self.last_overall
        } else {
            start.max(self.last_overall)
        };
        let phase_progress = if next == ExportState::Complete { 100.0 } else { 0.0 };
        self.throttle.should_emit(overall);
        self.send(overall, phase_progress, message.into(), None, None);
        true
    }

    /// Report in-phase progress (`fraction` in `[0, 1]`). Throttled to the
    /// configured step.
    pub fn advance(
        &mut self,
        fraction: f64,
        message: impl Into<String>,
        current_element: Option<&str>,
        frames_completed: Option<u64>,
    ) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (start, end) = self.state.overall_range(self.prerender_skipped);
        let overall = (start + (end - start) * fraction).max(self.last_overall);
        if !self.throttle.should_emit(overall) && fraction < 1.0 {
            return;
        }
        self.send(
            overall,
            fraction * 100.0,
            message.into(),
            current_element.map(str::to_string),
            frames_completed,
        );
    }

    fn send(
        &mut self,
        overall: f64,
        phase_progress: f64,
        status_message: String,
        current_element: Option<String>,
        frames_completed: Option<u64>,
    ) {
        self.last_overall = overall;
        let event = ExportProgress {
            phase: self.state,
            overall_progress: overall,
            phase_progress,
            status_message,
            current_element,
            frames_completed,
            total_frames: self.total_frames,
            estimated_time_remaining: if self.state.is_terminal() {
                None
            } else {
                self.clock.eta_secs(overall / 100.0)
            },
        };
        // A dropped receiver just means nobody is watching.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ExportState::*;
        assert!(Idle.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Compositing));
        assert!(Analyzing.can_transition_to(Cleanup));
        assert!(Cleanup.can_transition_to(Cancelled));
        assert!(!Compositing.can_transition_to(Prerendering));
        assert!(!Encoding.can_transition_to(Error));
        assert!(!Complete.can_transition_to(Cleanup));
        assert!(!Analyzing.can_transition_to(Complete));
    }

    #[test]
    fn test_compositing_band_widens_when_prerender_skipped() {
        assert_eq!(ExportState::Compositing.overall_range(true), (5.0, 90.0));
        assert_eq!(ExportState::Compositing.overall_range(false), (40.0, 90.0));
    }

    #[test]
    fn test_emitter_sequence_and_throttle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut emitter = ProgressEmitter::new(tx, 10.0);
        assert!(emitter.enter(ExportState::Analyzing, "Analyzing"));
        emitter.set_prerender_skipped(true);
        assert!(emitter.enter(ExportState::Compositing, "Compositing"));
        for i in 1..=100 {
            emitter.advance(i as f64 / 100.0, "frame", None, Some(i));
        }
        assert!(!emitter.enter(ExportState::Prerendering, "backwards"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events[0].phase, ExportState::Analyzing);
        assert_eq!(events[1].phase, ExportState::Compositing);
        assert_eq!(events[1].overall_progress, 5.0);
        // 85 points of band, 10-point steps, plus the final 100% of the phase.
        assert!(events.len() < 14);
        let last = events.last().unwrap();
        assert_eq!(last.overall_progress, 90.0);
        assert_eq!(last.frames_completed, Some(100));
        assert!(events
            .windows(2)
            .all(|w| w[0].overall_progress <= w[1].overall_progress));
    }

    #[test]
    fn test_cancel_handle_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
