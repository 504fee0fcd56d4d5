//! The timeline: tracks plus the mutation primitives the edit algebra and
//! external importers build on.
//!
//! Primitives validate their input and report rejection through their
//! return value (`false` / `None`) without touching state. Only insertion
//! returns a [`TimelineError`], since callers usually need to know why an
//! import was refused.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementId};
use crate::timing;
use crate::track::{Track, TrackId, TrackKind};

/// Ordered collection of tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Tracks in display order; index 0 is the bottom of the visual stack.
    #[serde(default)]
    pub tracks: Vec<Track>,

    /// Ripple editing toggle; session state, not persisted.
    #[serde(skip)]
    ripple_enabled: bool,
}

/// Errors raised when inserting into or loading a timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    #[error("Track of kind {track_kind} cannot hold a {element_kind} element")]
    IncompatibleKind {
        track_kind: &'static str,
        element_kind: &'static str,
    },

    #[error("Invalid element {id}: {message}")]
    InvalidElement { id: ElementId, message: String },

    #[error("Duplicate element id: {0}")]
    DuplicateId(ElementId),

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Timeline {
    /// Empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeline with a single empty main media track.
    pub fn with_main_track() -> Self {
        Self {
            tracks: vec![Track::main()],
            ripple_enabled: false,
        }
    }

    /// Build a timeline from existing tracks (imports, fixtures).
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            ripple_enabled: false,
        }
    }

    pub fn ripple_enabled(&self) -> bool {
        self.ripple_enabled
    }

    pub fn set_ripple_enabled(&mut self, enabled: bool) {
        self.ripple_enabled = enabled;
    }

    // Tracks

    /// Append a new empty track and return its id.
    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> TrackId {
        let track = Track::new(kind, name);
        let id = track.id.clone();
        self.tracks.push(track);
        id
    }

    /// Insert a new empty track at `index` (clamped) and return its id.
    pub fn insert_track(
        &mut self,
        index: usize,
        kind: TrackKind,
        name: impl Into<String>,
    ) -> TrackId {
        let track = Track::new(kind, name);
        let id = track.id.clone();
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        id
    }

    /// Remove a track without rippling other tracks.
    pub fn remove_track(&mut self, track_id: &str) -> Option<Track> {
        let index = self.track_index(track_id)?;
        Some(self.tracks.remove(index))
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    pub fn track_index(&self, track_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == track_id)
    }

    pub fn main_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.is_main)
    }

    /// First track of `kind`, if any.
    pub fn first_track_of(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Flip a track's mute flag; returns the new value.
    pub fn toggle_track_mute(&mut self, track_id: &str) -> Option<bool> {
        let track = self.track_mut(track_id)?;
        track.muted = !track.muted;
        Some(track.muted)
    }

    // Elements

    /// Insert an element into a track after validating it.
    pub fn add_element(
        &mut self,
        track_id: &str,
        element: Element,
    ) -> Result<ElementId, TimelineError> {
        if self.find_element(&element.id).is_some() {
            return Err(TimelineError::DuplicateId(element.id));
        }
        if !element.has_valid_timing() {
            return Err(TimelineError::InvalidElement {
                id: element.id.clone(),
                message: format!(
                    "start={} duration={} trim_start={} trim_end={}",
                    element.start_time, element.duration, element.trim_start, element.trim_end
                ),
            });
        }
        let track = self
            .track_mut(track_id)
            .ok_or_else(|| TimelineError::UnknownTrack(track_id.to_string()))?;
        if !track.kind.accepts(&element.kind) {
            return Err(TimelineError::IncompatibleKind {
                track_kind: track.kind.as_str(),
                element_kind: element.kind.type_name(),
            });
        }
        let id = element.id.clone();
        tracing::debug!(track = %track_id, element = %id, kind = element.kind.type_name(), "Element added");
        track.elements.push(element);
        Ok(id)
    }

    /// Remove an element without rippling.
    pub fn remove_element(&mut self, track_id: &str, element_id: &str) -> Option<Element> {
        let track = self.track_mut(track_id)?;
        let index = track.position(element_id)?;
        Some(track.elements.remove(index))
    }

    pub fn element(&self, track_id: &str, element_id: &str) -> Option<&Element> {
        self.track(track_id)?.element(element_id)
    }

    pub fn element_mut(&mut self, track_id: &str, element_id: &str) -> Option<&mut Element> {
        self.track_mut(track_id)?.element_mut(element_id)
    }

    /// Locate an element anywhere in the timeline.
    pub fn find_element(&self, element_id: &str) -> Option<(&Track, &Element)> {
        self.tracks
            .iter()
            .find_map(|t| t.element(element_id).map(|e| (t, e)))
    }

    /// Set an element's start time (no ripple). Rejects negative or
    /// non-finite starts.
    pub fn move_element(&mut self, track_id: &str, element_id: &str, new_start: f64) -> bool {
        if !new_start.is_finite() || new_start < 0.0 {
            return false;
        }
        match self.element_mut(track_id, element_id) {
            Some(element) => {
                element.start_time = new_start;
                true
            }
            None => false,
        }
    }

    /// Move an element to another track of a compatible kind, keeping its
    /// timing.
    pub fn move_element_to_track(&mut self, from: &str, to: &str, element_id: &str) -> bool {
        if from == to {
            return self.element(from, element_id).is_some();
        }
        let (Some(source), Some(target)) = (self.track(from), self.track(to)) else {
            return false;
        };
        let Some(element) = source.element(element_id) else {
            return false;
        };
        if !target.kind.accepts(&element.kind) {
            return false;
        }
        let Some(element) = self.remove_element(from, element_id) else {
            return false;
        };
        match self.track_mut(to) {
            Some(target) => {
                target.elements.push(element);
                true
            }
            None => false,
        }
    }

    /// Change the untrimmed duration. Rejected when trims would no longer fit.
    pub fn resize_element(&mut self, track_id: &str, element_id: &str, new_duration: f64) -> bool {
        if !new_duration.is_finite() || new_duration <= 0.0 {
            return false;
        }
        let Some(element) = self.element_mut(track_id, element_id) else {
            return false;
        };
        if !timing::is_valid_trim(new_duration, element.trim_start, element.trim_end) {
            return false;
        }
        element.duration = new_duration;
        true
    }

    /// Replace both trims. Rejected when negative or when they exceed the
    /// duration.
    pub fn trim_element(
        &mut self,
        track_id: &str,
        element_id: &str,
        trim_start: f64,
        trim_end: f64,
    ) -> bool {
        let Some(element) = self.element_mut(track_id, element_id) else {
            return false;
        };
        if !timing::is_valid_trim(element.duration, trim_start, trim_end) {
            return false;
        }
        element.trim_start = trim_start;
        element.trim_end = trim_end;
        true
    }

    // Derived values

    /// Latest effective end over all elements (0 when empty).
    pub fn total_duration(&self) -> f64 {
        self.tracks.iter().map(Track::end_time).fold(0.0, f64::max)
    }

    pub fn element_count(&self) -> usize {
        self.tracks.iter().map(|t| t.elements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }

    /// Element ids used by more than one element, each listed once.
    pub fn duplicate_element_ids(&self) -> Vec<ElementId> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates: Vec<ElementId> = vec![];
        for element in self.tracks.iter().flat_map(|t| &t.elements) {
            if !seen.insert(element.id.as_str()) && !duplicates.contains(&element.id) {
                duplicates.push(element.id.clone());
            }
        }
        duplicates
    }

    /// Consistency report. Empty when the timeline is clean.
    pub fn validate(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .duplicate_element_ids()
            .into_iter()
            .map(|id| format!("Duplicate element id {id}"))
            .collect();

        for track in &self.tracks {
            for element in &track.elements {
                if element.start_time < 0.0 || !element.start_time.is_finite() {
                    issues.push(format!(
                        "Element {} on track {} has invalid start {}",
                        element.id, track.name, element.start_time
                    ));
                }
                if element.duration <= 0.0 || !element.duration.is_finite() {
                    issues.push(format!(
                        "Element {} on track {} has non-positive duration {}",
                        element.id, track.name, element.duration
                    ));
                }
                if !timing::is_valid_trim(element.duration, element.trim_start, element.trim_end)
                {
                    issues.push(format!(
                        "Element {} on track {} has invalid trims ({}, {}) for duration {}",
                        element.id,
                        track.name,
                        element.trim_start,
                        element.trim_end,
                        element.duration
                    ));
                }
                if !track.kind.accepts(&element.kind) {
                    issues.push(format!(
                        "Element {} ({}) does not belong on {} track {}",
                        element.id,
                        element.kind.type_name(),
                        track.kind.as_str(),
                        track.name
                    ));
                }
            }

            if track.is_main {
                for (a, b) in track.overlapping_pairs() {
                    issues.push(format!("Main track elements {a} and {b} overlap"));
                }
            }
        }

        if self.tracks.iter().filter(|t| t.is_main).count() > 1 {
            issues.push("More than one main track".to_string());
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_element_validates_kind_and_timing() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();

        assert!(timeline
            .add_element(&main, Element::media("clip", 0.0, 5.0))
            .is_ok());

        let err = timeline
            .add_element(&main, Element::text("Hello", 0.0, 5.0))
            .unwrap_err();
        assert!(matches!(err, TimelineError::IncompatibleKind { .. }));

        let err = timeline
            .add_element(&main, Element::media("clip", -1.0, 5.0))
            .unwrap_err();
        assert!(matches!(err, TimelineError::InvalidElement { .. }));

        let err = timeline
            .add_element(&main, Element::media("clip", 0.0, 5.0).with_trim(3.0, 3.0))
            .unwrap_err();
        assert!(matches!(err, TimelineError::InvalidElement { .. }));

        let err = timeline
            .add_element("nope", Element::media("clip", 0.0, 5.0))
            .unwrap_err();
        assert!(matches!(err, TimelineError::UnknownTrack(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline
            .add_element(&main, Element::media("a", 0.0, 1.0).with_id("x"))
            .unwrap();
        let err = timeline
            .add_element(&main, Element::media("b", 2.0, 1.0).with_id("x"))
            .unwrap_err();
        assert!(matches!(err, TimelineError::DuplicateId(_)));
    }

    #[test]
    fn test_total_duration_uses_effective_end() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let text = timeline.add_track(TrackKind::Text, "Text");
        timeline
            .add_element(&main, Element::media("a", 0.0, 10.0).with_trim(0.0, 4.0))
            .unwrap();
        timeline
            .add_element(&text, Element::text("t", 2.0, 3.0))
            .unwrap();
        assert_eq!(timeline.total_duration(), 6.0);
        assert_eq!(Timeline::new().total_duration(), 0.0);
    }

    #[test]
    fn test_trim_rejects_invalid_without_mutation() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let id = timeline
            .add_element(&main, Element::media("a", 0.0, 10.0))
            .unwrap();

        assert!(!timeline.trim_element(&main, &id, -1.0, 0.0));
        assert!(!timeline.trim_element(&main, &id, 6.0, 5.0));
        assert_eq!(timeline.element(&main, &id).unwrap().trim_start, 0.0);

        assert!(timeline.trim_element(&main, &id, 2.0, 3.0));
        assert_eq!(timeline.element(&main, &id).unwrap().effective_duration(), 5.0);

        assert!(!timeline.resize_element(&main, &id, 4.0));
        assert!(timeline.resize_element(&main, &id, 12.0));
    }

    #[test]
    fn test_move_element_rejects_negative_start() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let id = timeline
            .add_element(&main, Element::media("a", 1.0, 2.0))
            .unwrap();
        assert!(!timeline.move_element(&main, &id, -0.5));
        assert!(timeline.move_element(&main, &id, 3.0));
        assert_eq!(timeline.element(&main, &id).unwrap().start_time, 3.0);
    }

    #[test]
    fn test_move_element_to_track_checks_kind() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let overlay = timeline.add_track(TrackKind::Media, "Overlay");
        let text = timeline.add_track(TrackKind::Text, "Text");
        let id = timeline
            .add_element(&main, Element::media("a", 1.0, 2.0))
            .unwrap();

        assert!(!timeline.move_element_to_track(&main, &text, &id));
        assert!(timeline.move_element_to_track(&main, &overlay, &id));
        assert!(timeline.element(&overlay, &id).is_some());
        assert!(timeline.element(&main, &id).is_none());
    }

    #[test]
    fn test_validate_reports_main_track_overlap_only() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let stickers = timeline.add_track(TrackKind::Sticker, "Stickers");
        timeline
            .add_element(&main, Element::media("a", 0.0, 5.0).with_id("a"))
            .unwrap();
        timeline
            .add_element(&main, Element::media("b", 4.0, 5.0).with_id("b"))
            .unwrap();
        timeline
            .add_element(&stickers, Element::sticker("s", 0.0, 5.0, 1))
            .unwrap();
        timeline
            .add_element(&stickers, Element::sticker("s", 1.0, 5.0, 2))
            .unwrap();

        let issues = timeline.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("overlap"));
    }

    #[test]
    fn test_duplicate_ids_are_reported_once() {
        let mut main = Track::main();
        main.elements = vec![
            Element::media("a", 0.0, 1.0).with_id("x"),
            Element::media("b", 1.0, 1.0).with_id("x"),
            Element::media("c", 2.0, 1.0).with_id("x"),
            Element::media("d", 3.0, 1.0).with_id("y"),
        ];
        let timeline = Timeline::from_tracks(vec![main]);
        assert_eq!(timeline.duplicate_element_ids(), vec!["x".to_string()]);

        let issues = timeline.validate();
        assert_eq!(issues, vec!["Duplicate element id x".to_string()]);
    }

    #[test]
    fn test_insert_track_clamps_index() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();

        let front = timeline.insert_track(0, TrackKind::Text, "Front");
        let back = timeline.insert_track(99, TrackKind::Sticker, "Back");
        let middle = timeline.insert_track(1, TrackKind::Caption, "Middle");

        let order: Vec<&str> = timeline.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec![front.as_str(), middle.as_str(), main.as_str(), back.as_str()]);
    }

    #[test]
    fn test_insert_track_keeps_single_main() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();

        let inserted = timeline.insert_track(0, TrackKind::Media, "Overlay");
        assert!(!timeline.track(&inserted).unwrap().is_main);
        assert_eq!(timeline.main_track().unwrap().id, main);
        assert_eq!(timeline.tracks.iter().filter(|t| t.is_main).count(), 1);
        assert!(timeline.validate().is_empty());

        // Main-track elements still land on the original main track.
        timeline
            .add_element(&main, Element::media("m", 0.0, 2.0))
            .unwrap();
        assert!(timeline.track(&inserted).unwrap().elements.is_empty());
    }

    #[test]
    fn test_toggle_track_mute_twice_restores() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        assert!(!timeline.track(&main).unwrap().muted);

        assert_eq!(timeline.toggle_track_mute(&main), Some(true));
        assert!(timeline.track(&main).unwrap().muted);
        assert_eq!(timeline.toggle_track_mute(&main), Some(false));
        assert!(!timeline.track(&main).unwrap().muted);

        assert_eq!(timeline.toggle_track_mute("missing"), None);
    }

    #[test]
    fn test_timeline_round_trips_tracks_shape() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline
            .add_element(&main, Element::media("a", 0.0, 5.0))
            .unwrap();
        timeline.set_ripple_enabled(true);

        let json = serde_json::to_value(&timeline).unwrap();
        assert!(json["tracks"][0]["elements"].is_array());
        assert_eq!(json["tracks"][0]["type"], "media");
        assert!(json.get("rippleEnabled").is_none());

        let parsed: Timeline = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.tracks, timeline.tracks);
        assert!(!parsed.ripple_enabled());
    }
}
