//! Tracks: typed, ordered containers of elements.

use serde::{Deserialize, Serialize};

use crate::element::{new_id, Element, ElementKind};

/// Identifier of a track.
pub type TrackId = String;

/// What a track holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    Media,
    Text,
    Audio,
    Sticker,
    OverlayComponent,
    Caption,
}

impl TrackKind {
    /// The track kind that natively holds an element payload.
    pub fn for_element(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Media(_) => TrackKind::Media,
            ElementKind::Audio(_) => TrackKind::Audio,
            ElementKind::Text(_) => TrackKind::Text,
            ElementKind::Sticker(_) => TrackKind::Sticker,
            ElementKind::OverlayComponent(_) => TrackKind::OverlayComponent,
            ElementKind::Caption(_) => TrackKind::Caption,
        }
    }

    /// Whether an element of this payload may be placed on the track.
    pub fn accepts(self, kind: &ElementKind) -> bool {
        Self::for_element(kind) == self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Media => "media",
            TrackKind::Text => "text",
            TrackKind::Audio => "audio",
            TrackKind::Sticker => "sticker",
            TrackKind::OverlayComponent => "overlay-component",
            TrackKind::Caption => "caption",
        }
    }
}

/// A track and the elements it owns.
///
/// `elements` is kept in insertion order. Anything that needs temporal
/// order goes through [`Track::sorted_indices`], which orders by start
/// time and falls back to insertion order for equal starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: TrackKind,

    #[serde(default)]
    pub elements: Vec<Element>,

    #[serde(default)]
    pub muted: bool,

    /// The primary media track; expected to stay gap/overlap consistent.
    #[serde(default)]
    pub is_main: bool,
}

impl Track {
    /// Create an empty track with a fresh id.
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            kind,
            elements: Vec::new(),
            muted: false,
            is_main: false,
        }
    }

    /// Create the main media track.
    pub fn main() -> Self {
        let mut track = Self::new(TrackKind::Media, "Main Track");
        track.is_main = true;
        track
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Storage index of an element.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    /// Storage indices ordered by `(start_time, insertion order)`.
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.elements.len()).collect();
        // Stable sort keeps insertion order for equal start times.
        indices.sort_by(|&a, &b| {
            self.elements[a]
                .start_time
                .total_cmp(&self.elements[b].start_time)
        });
        indices
    }

    /// Elements in temporal order.
    pub fn sorted_elements(&self) -> Vec<&Element> {
        self.sorted_indices()
            .into_iter()
            .map(|i| &self.elements[i])
            .collect()
    }

    /// End of the last effective range on this track (0 when empty).
    pub fn end_time(&self) -> f64 {
        self.elements
            .iter()
            .map(Element::effective_end)
            .fold(0.0, f64::max)
    }

    /// Whether any element's effective range intersects `[start, end)`,
    /// ignoring `exclude`.
    pub fn has_content_in(&self, start: f64, end: f64, exclude: Option<&str>) -> bool {
        let span = start..end;
        self.elements
            .iter()
            .filter(|e| Some(e.id.as_str()) != exclude)
            .any(|e| crate::element::ranges_overlap(&e.effective_range(), &span))
    }

    /// Pairs of element ids whose effective ranges overlap, in temporal order.
    pub fn overlapping_pairs(&self) -> Vec<(String, String)> {
        let sorted = self.sorted_elements();
        let mut pairs = Vec::new();
        for (i, a) in sorted.iter().enumerate() {
            for b in sorted.iter().skip(i + 1) {
                if b.start_time >= a.effective_end() {
                    break;
                }
                if a.overlaps(b) {
                    pairs.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        pairs
    }

    /// Shift every element starting at or after `threshold` by `delta`
    /// seconds, clamping starts at zero. Returns how many moved.
    pub fn shift_from(&mut self, threshold: f64, delta: f64, exclude: Option<&str>) -> usize {
        let mut moved = 0;
        for element in self
            .elements
            .iter_mut()
            .filter(|e| Some(e.id.as_str()) != exclude)
        {
            if element.start_time >= threshold - crate::timing::TIME_EPSILON {
                element.start_time = (element.start_time + delta).max(0.0);
                moved += 1;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_indices_fall_back_to_insertion_order() {
        let mut track = Track::new(TrackKind::Media, "V1");
        track.elements.push(Element::media("a", 4.0, 1.0).with_id("late"));
        track.elements.push(Element::media("b", 1.0, 1.0).with_id("first-tie"));
        track.elements.push(Element::media("c", 1.0, 1.0).with_id("second-tie"));

        let order: Vec<&str> = track
            .sorted_elements()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(order, vec!["first-tie", "second-tie", "late"]);
    }

    #[test]
    fn test_track_kind_accepts_matching_payload_only() {
        let media = Element::media("m", 0.0, 1.0);
        let text = Element::text("hi", 0.0, 1.0);
        assert!(TrackKind::Media.accepts(&media.kind));
        assert!(!TrackKind::Media.accepts(&text.kind));
        assert!(TrackKind::Text.accepts(&text.kind));
    }

    #[test]
    fn test_overlapping_pairs() {
        let mut track = Track::new(TrackKind::Sticker, "Stickers");
        track.elements.push(Element::sticker("a", 0.0, 5.0, 0).with_id("a"));
        track.elements.push(Element::sticker("b", 3.0, 5.0, 0).with_id("b"));
        track.elements.push(Element::sticker("c", 8.0, 1.0, 0).with_id("c"));
        assert_eq!(
            track.overlapping_pairs(),
            vec![("a".to_string(), "b".to_string())]
        );
    }
}
