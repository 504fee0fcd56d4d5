//! Edit algebra built on the timeline primitives.
//!
//! Every operation either applies completely or leaves the timeline
//! untouched and reports a no-op (`None` / `false`). Splits only move trim
//! fields: `duration` is never altered, so both halves still describe the
//! same source and can be re-joined by trimming.

use crate::element::{new_id, AudioPayload, Element, ElementId, ElementKind};
use crate::timeline::Timeline;
use crate::timing::TIME_EPSILON;
use crate::track::{Track, TrackKind};

impl Timeline {
    /// Split an element at timeline time `at`.
    ///
    /// The original element keeps its id and becomes the left part; a new
    /// element (fresh id) holding the right part is inserted directly after
    /// it. Returns the right part's id, or `None` when `at` is not strictly
    /// inside the effective range.
    pub fn split(&mut self, track_id: &str, element_id: &str, at: f64) -> Option<ElementId> {
        let track = self.track_mut(track_id)?;
        let index = track.position(element_id)?;
        let original = &track.elements[index];
        if !at.is_finite() || !original.strictly_contains(at) {
            tracing::debug!(element = %element_id, at, "Split point outside effective range");
            return None;
        }

        let left_extra_trim = original.effective_end() - at;
        let right_extra_trim = at - original.start_time;

        let mut right = original.clone();
        right.id = new_id();
        right.start_time = at;
        right.trim_start += right_extra_trim;
        if !right.name.is_empty() {
            right.name = format!("{} (right)", right.name);
        }

        let left = &mut track.elements[index];
        left.trim_end += left_extra_trim;

        let right_id = right.id.clone();
        track.elements.insert(index + 1, right);
        tracing::debug!(element = %element_id, right = %right_id, at, "Element split");
        Some(right_id)
    }

    /// Split and delete the right part. Returns the surviving (original) id.
    pub fn split_and_keep_left(
        &mut self,
        track_id: &str,
        element_id: &str,
        at: f64,
    ) -> Option<ElementId> {
        let right = self.split(track_id, element_id, at)?;
        self.remove_element(track_id, &right)?;
        Some(element_id.to_string())
    }

    /// Split and delete the left part. Returns the surviving (new) id.
    pub fn split_and_keep_right(
        &mut self,
        track_id: &str,
        element_id: &str,
        at: f64,
    ) -> Option<ElementId> {
        let right = self.split(track_id, element_id, at)?;
        self.remove_element(track_id, element_id)?;
        Some(right)
    }

    /// Remove an element; with ripple on, later elements on the same track
    /// close the gap.
    pub fn remove_element_with_ripple(
        &mut self,
        track_id: &str,
        element_id: &str,
    ) -> Option<Element> {
        let ripple = self.ripple_enabled();
        let track = self.track_mut(track_id)?;
        let index = track.position(element_id)?;
        let removed = track.elements.remove(index);

        if ripple {
            let gap = removed.effective_duration();
            let moved = track.shift_from(removed.effective_end(), -gap, None);
            tracing::debug!(element = %element_id, gap, moved, "Ripple removal");
        }
        Some(removed)
    }

    /// Remove a track; with ripple on, each other track whose content does
    /// not overlap a removed element is pulled back by that element's
    /// effective duration.
    ///
    /// Removed elements are processed latest-first so earlier shifts never
    /// change the thresholds of later ones.
    pub fn remove_track_with_ripple(&mut self, track_id: &str) -> Option<Track> {
        let ripple = self.ripple_enabled();
        let removed = self.remove_track(track_id)?;
        if !ripple {
            return Some(removed);
        }

        let mut spans: Vec<(f64, f64)> = removed
            .elements
            .iter()
            .filter(|e| e.effective_duration() > 0.0)
            .map(|e| (e.start_time, e.effective_end()))
            .collect();
        spans.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (start, end) in spans {
            let gap = end - start;
            for track in &mut self.tracks {
                if track.has_content_in(start, end, None) {
                    continue;
                }
                track.shift_from(end, -gap, None);
            }
        }

        tracing::debug!(track = %track_id, elements = removed.elements.len(), "Ripple track removal");
        Some(removed)
    }

    /// Move an element; with ripple on, elements at or after the new start
    /// are pushed later so nothing overlaps the moved element or each other.
    pub fn move_element_with_ripple(
        &mut self,
        track_id: &str,
        element_id: &str,
        new_start: f64,
    ) -> bool {
        if !self.move_element(track_id, element_id, new_start) {
            return false;
        }
        if self.ripple_enabled() {
            if let Some(track) = self.track_mut(track_id) {
                push_following(track, element_id);
            }
        }
        true
    }

    /// Insert an element; with ripple on, elements at or after its start are
    /// pushed later to make room.
    pub fn insert_element_with_ripple(
        &mut self,
        track_id: &str,
        element: Element,
    ) -> Result<ElementId, crate::timeline::TimelineError> {
        let id = self.add_element(track_id, element)?;
        if self.ripple_enabled() {
            if let Some(track) = self.track_mut(track_id) {
                push_following(track, &id);
            }
        }
        Ok(id)
    }

    /// Extract the audio of a media element onto an audio track.
    ///
    /// Reuses the first audio track or creates one. The visual element is
    /// left untouched. Returns the new audio element's id.
    pub fn separate_audio(&mut self, track_id: &str, element_id: &str) -> Option<ElementId> {
        let source = self.element(track_id, element_id)?;
        let ElementKind::Media(media) = &source.kind else {
            return None;
        };

        let audio = Element {
            id: new_id(),
            name: if source.name.is_empty() {
                "Audio".to_string()
            } else {
                format!("{} (audio)", source.name)
            },
            start_time: source.start_time,
            duration: source.duration,
            trim_start: source.trim_start,
            trim_end: source.trim_end,
            kind: ElementKind::Audio(AudioPayload {
                media_id: media.media_id.clone(),
                volume: 1.0,
            }),
        };

        let existing = self
            .first_track_of(TrackKind::Audio)
            .map(|track| track.id.clone());
        let audio_track = match existing {
            Some(id) => id,
            None => self.add_track(TrackKind::Audio, "Audio"),
        };
        self.add_element(&audio_track, audio).ok()
    }
}

/// Push elements that start at or after `anchor`'s start so that none of
/// them begins before the running end of the chain.
fn push_following(track: &mut Track, anchor_id: &str) {
    let Some(anchor) = track.element(anchor_id) else {
        return;
    };
    let anchor_start = anchor.start_time;
    let mut cursor = anchor.effective_end();

    for index in track.sorted_indices() {
        let element = &mut track.elements[index];
        if element.id == anchor_id || element.start_time < anchor_start - TIME_EPSILON {
            continue;
        }
        if element.start_time < cursor - TIME_EPSILON {
            tracing::trace!(element = %element.id, from = element.start_time, to = cursor, "Ripple push");
            element.start_time = cursor;
        }
        cursor = cursor.max(element.effective_end());
    }
}
