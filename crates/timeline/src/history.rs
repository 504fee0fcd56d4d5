//! Snapshot-based undo/redo for timeline edits.
//!
//! Callers push the state *before* an edit. Undo hands back that state and
//! parks the current one on the redo stack; redo does the reverse. A batch
//! collapses a run of edits (a drag, a multi-select delete) into one entry.
//!
//! ```ignore
//! let mut history = EditHistory::new(100);
//! history.push("Split clip", &timeline);
//! timeline.split(&track, &clip, 4.0);
//!
//! if let Some(previous) = history.undo(&timeline) {
//!     timeline = previous;
//! }
//! ```

use std::time::Instant;

use crate::timeline::Timeline;

/// Default maximum undo depth.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// One recorded timeline state.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Label of the edit this entry undoes (e.g. "Split clip").
    pub label: String,
    pub snapshot: Timeline,
    pub recorded_at: Instant,
}

/// Undo/redo stacks of timeline snapshots.
#[derive(Debug)]
pub struct EditHistory {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
    /// Label and "before" state of the open batch, if any.
    batch: Option<(String, Timeline)>,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl EditHistory {
    /// History keeping at most `max_entries` undo steps (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            batch: None,
        }
    }

    /// Record the state before an edit. Clears the redo stack. Ignored
    /// while a batch is open.
    pub fn push(&mut self, label: &str, before: &Timeline) {
        if self.batch.is_some() {
            tracing::debug!(label, "Push suppressed: batch in progress");
            return;
        }
        self.record(label.to_string(), before.clone());
    }

    fn record(&mut self, label: String, snapshot: Timeline) {
        self.redo_stack.clear();
        self.undo_stack.push(HistoryEntry {
            label,
            snapshot,
            recorded_at: Instant::now(),
        });

        if self.undo_stack.len() > self.max_entries {
            let excess = self.undo_stack.len() - self.max_entries;
            self.undo_stack.drain(..excess);
        }

        tracing::debug!(undo_depth = self.undo_stack.len(), "History entry pushed");
    }

    /// Step back. `current` goes onto the redo stack; the returned snapshot
    /// replaces it. The ripple toggle of `current` is preserved.
    pub fn undo(&mut self, current: &Timeline) -> Option<Timeline> {
        self.abandon_open_batch("undo");
        let entry = self.undo_stack.pop()?;
        tracing::debug!(label = %entry.label, undo_remaining = self.undo_stack.len(), "Undo");

        self.redo_stack.push(HistoryEntry {
            label: entry.label.clone(),
            snapshot: current.clone(),
            recorded_at: Instant::now(),
        });

        let mut restored = entry.snapshot;
        restored.set_ripple_enabled(current.ripple_enabled());
        Some(restored)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: &Timeline) -> Option<Timeline> {
        self.abandon_open_batch("redo");
        let entry = self.redo_stack.pop()?;
        tracing::debug!(label = %entry.label, redo_remaining = self.redo_stack.len(), "Redo");

        self.undo_stack.push(HistoryEntry {
            label: entry.label.clone(),
            snapshot: current.clone(),
            recorded_at: Instant::now(),
        });

        let mut restored = entry.snapshot;
        restored.set_ripple_enabled(current.ripple_enabled());
        Some(restored)
    }

    /// Open a batch; pushes are suppressed until [`EditHistory::end_batch`].
    pub fn start_batch(&mut self, label: &str, before: &Timeline) {
        if self.batch.is_some() {
            tracing::warn!(label, "Batch already open, keeping the first one");
            return;
        }
        self.batch = Some((label.to_string(), before.clone()));
    }

    /// Close the batch, recording a single entry if the tracks changed.
    /// Returns whether an entry was recorded.
    pub fn end_batch(&mut self, current: &Timeline) -> bool {
        let Some((label, before)) = self.batch.take() else {
            return false;
        };
        if before.tracks == current.tracks {
            tracing::debug!(label = %label, "Batch ended without changes");
            return false;
        }
        self.record(label, before);
        true
    }

    fn abandon_open_batch(&mut self, during: &str) {
        if let Some((label, _)) = self.batch.take() {
            tracing::warn!(label = %label, during, "Ending unfinished batch");
        }
    }

    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.label.as_str())
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn timeline_with_clip() -> (Timeline, String) {
        let mut timeline = Timeline::with_main_track();
        let track = timeline.tracks[0].id.clone();
        timeline
            .add_element(&track, Element::media("m1", 0.0, 10.0).with_id("clip"))
            .unwrap();
        (timeline, track)
    }

    #[test]
    fn test_undo_redo_split() {
        let (mut timeline, track) = timeline_with_clip();
        let mut history = EditHistory::new(10);

        history.push("Split clip", &timeline);
        timeline.split(&track, "clip", 4.0).unwrap();
        assert_eq!(timeline.element_count(), 2);

        timeline = history.undo(&timeline).unwrap();
        assert_eq!(timeline.element_count(), 1);
        assert_eq!(history.redo_label(), Some("Split clip"));

        timeline = history.redo(&timeline).unwrap();
        assert_eq!(timeline.element_count(), 2);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let (mut timeline, track) = timeline_with_clip();
        let mut history = EditHistory::new(10);

        history.push("Move", &timeline);
        timeline.move_element(&track, "clip", 2.0);
        timeline = history.undo(&timeline).unwrap();
        assert!(history.can_redo());

        history.push("Move again", &timeline);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_max_entries_drops_oldest() {
        let (mut timeline, track) = timeline_with_clip();
        let mut history = EditHistory::new(3);
        for i in 0..5 {
            history.push(&format!("Move {i}"), &timeline);
            timeline.move_element(&track, "clip", i as f64 + 1.0);
        }
        assert_eq!(history.undo_depth(), 3);
        assert_eq!(history.undo_label(), Some("Move 4"));
    }

    #[test]
    fn test_batch_collapses_edits() {
        let (mut timeline, track) = timeline_with_clip();
        let mut history = EditHistory::new(10);

        history.start_batch("Drag clip", &timeline);
        for step in 1..=5 {
            history.push("ignored", &timeline);
            timeline.move_element(&track, "clip", step as f64);
        }
        assert!(history.end_batch(&timeline));
        assert_eq!(history.undo_depth(), 1);

        let restored = history.undo(&timeline).unwrap();
        assert_eq!(restored.element(&track, "clip").unwrap().start_time, 0.0);
    }

    #[test]
    fn test_empty_batch_records_nothing() {
        let (timeline, _) = timeline_with_clip();
        let mut history = EditHistory::new(10);
        history.start_batch("Nothing", &timeline);
        assert!(!history.end_batch(&timeline));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_undo_keeps_current_ripple_toggle() {
        let (mut timeline, track) = timeline_with_clip();
        let mut history = EditHistory::new(10);
        history.push("Move", &timeline);
        timeline.move_element(&track, "clip", 3.0);
        timeline.set_ripple_enabled(true);

        let restored = history.undo(&timeline).unwrap();
        assert!(restored.ripple_enabled());
    }
}
