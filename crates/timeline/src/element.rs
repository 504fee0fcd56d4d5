//! Timeline elements and their type-specific payloads.
//!
//! On the wire an element is a flat JSON object whose `type` field selects
//! the payload:
//!
//! ```json
//! {"id":"…","startTime":5.0,"duration":10.0,"trimStart":0.0,"trimEnd":0.0,
//!  "type":"sticker","mediaItemId":"star","position":{"x":50,"y":50}, …}
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::timing::{self, TIME_EPSILON};

/// Identifier of an element. Unique within a timeline.
pub type ElementId = String;

/// Generate a fresh identifier for a new element or track.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single item placed on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Unique element identifier.
    pub id: ElementId,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Timeline position of the (trimmed) element start, in seconds.
    pub start_time: f64,

    /// Untrimmed source duration in seconds.
    pub duration: f64,

    /// Seconds cut from the head of the source.
    #[serde(default)]
    pub trim_start: f64,

    /// Seconds cut from the tail of the source.
    #[serde(default)]
    pub trim_end: f64,

    /// Type-specific payload.
    #[serde(flatten)]
    pub kind: ElementKind,
}

/// Element payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementKind {
    /// Video or still image from the media library.
    Media(MediaPayload),
    /// Audio-only reference to a media source.
    Audio(AudioPayload),
    /// Free-positioned text.
    Text(TextPayload),
    /// Image overlay with explicit transform and z-index.
    Sticker(StickerPayload),
    /// Procedurally rendered component.
    OverlayComponent(ComponentPayload),
    /// Subtitle line.
    Caption(CaptionPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    pub media_id: String,

    /// Linear gain `[0.0, 1.0]`.
    #[serde(default = "default_unit")]
    pub volume: f64,
}

/// Text styling shared by text and caption elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    /// Font size in output pixels at 1080p; scaled with canvas height.
    pub font_size: f64,
    pub font_family: String,
    /// Hex color, e.g. `#ffffff`.
    pub color: String,
    /// Hex color or `transparent`.
    pub background_color: String,
    pub align: TextAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            font_family: "Arial".to_string(),
            color: "#ffffff".to_string(),
            background_color: "transparent".to_string(),
            align: TextAlign::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
    /// Center X, percent of canvas width.
    #[serde(default = "default_center")]
    pub x: f64,
    /// Center Y, percent of canvas height.
    #[serde(default = "default_center")]
    pub y: f64,
    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_unit")]
    pub opacity: f64,
}

/// Center point in percent of canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayPosition {
    pub x: f64,
    pub y: f64,
}

/// Size in percent of `min(canvas width, canvas height)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlaySize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerPayload {
    pub media_item_id: String,
    pub position: OverlayPosition,
    pub size: OverlaySize,
    /// Degrees, clockwise, around the sticker center.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_unit")]
    pub opacity: f64,
    /// Stacking order among stickers; higher draws later.
    #[serde(default)]
    pub z_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPayload {
    pub component_id: String,
    /// Props merged over the component's defaults.
    #[serde(default)]
    pub props: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionPayload {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
    /// Center Y, percent of canvas height.
    #[serde(default = "default_caption_y")]
    pub y: f64,
}

fn default_unit() -> f64 {
    1.0
}

fn default_center() -> f64 {
    50.0
}

fn default_caption_y() -> f64 {
    90.0
}

impl ElementKind {
    /// Wire name of the variant (`media`, `overlay-component`, …).
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Media(_) => "media",
            ElementKind::Audio(_) => "audio",
            ElementKind::Text(_) => "text",
            ElementKind::Sticker(_) => "sticker",
            ElementKind::OverlayComponent(_) => "overlay-component",
            ElementKind::Caption(_) => "caption",
        }
    }

    /// Whether the element contributes pixels to the output.
    pub fn is_visual(&self) -> bool {
        !matches!(self, ElementKind::Audio(_))
    }

    /// Whether the element must be rendered frame-by-frame before compositing.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ElementKind::OverlayComponent(_))
    }
}

impl Element {
    /// Create an element with a fresh id and no trim.
    pub fn new(kind: ElementKind, start_time: f64, duration: f64) -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            start_time,
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
            kind,
        }
    }

    pub fn media(media_id: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self::new(
            ElementKind::Media(MediaPayload {
                media_id: media_id.into(),
            }),
            start_time,
            duration,
        )
    }

    pub fn text(content: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self::new(
            ElementKind::Text(TextPayload {
                content: content.into(),
                style: TextStyle::default(),
                x: default_center(),
                y: default_center(),
                rotation: 0.0,
                opacity: 1.0,
            }),
            start_time,
            duration,
        )
    }

    pub fn sticker(
        media_item_id: impl Into<String>,
        start_time: f64,
        duration: f64,
        z_index: i32,
    ) -> Self {
        Self::new(
            ElementKind::Sticker(StickerPayload {
                media_item_id: media_item_id.into(),
                position: OverlayPosition { x: 50.0, y: 50.0 },
                size: OverlaySize {
                    width: 20.0,
                    height: 20.0,
                },
                rotation: 0.0,
                opacity: 1.0,
                z_index,
            }),
            start_time,
            duration,
        )
    }

    pub fn component(
        component_id: impl Into<String>,
        props: serde_json::Value,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self::new(
            ElementKind::OverlayComponent(ComponentPayload {
                component_id: component_id.into(),
                props,
            }),
            start_time,
            duration,
        )
    }

    pub fn caption(text: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self::new(
            ElementKind::Caption(CaptionPayload {
                text: text.into(),
                style: TextStyle::default(),
                y: default_caption_y(),
            }),
            start_time,
            duration,
        )
    }

    /// Replace the id (fixtures and deserialized imports).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    /// Duration after trimming.
    pub fn effective_duration(&self) -> f64 {
        timing::effective_duration(self.duration, self.trim_start, self.trim_end)
    }

    /// End of the effective range (exclusive).
    pub fn effective_end(&self) -> f64 {
        self.start_time + self.effective_duration()
    }

    /// `[start_time, effective_end)`.
    pub fn effective_range(&self) -> Range<f64> {
        self.start_time..self.effective_end()
    }

    /// Whether `t` lies strictly inside the effective range.
    pub fn strictly_contains(&self, t: f64) -> bool {
        t > self.start_time + TIME_EPSILON && t < self.effective_end() - TIME_EPSILON
    }

    /// Whether the effective ranges of two elements intersect.
    pub fn overlaps(&self, other: &Element) -> bool {
        ranges_overlap(&self.effective_range(), &other.effective_range())
    }

    /// Whether all timing fields satisfy the model invariants.
    pub fn has_valid_timing(&self) -> bool {
        self.start_time.is_finite()
            && self.start_time >= 0.0
            && self.duration.is_finite()
            && self.duration > 0.0
            && timing::is_valid_trim(self.duration, self.trim_start, self.trim_end)
    }

    /// Offset into the source at timeline time `t` (seconds).
    pub fn source_time_at(&self, t: f64) -> f64 {
        (t - self.start_time).max(0.0) + self.trim_start
    }
}

/// Whether two half-open time ranges intersect (touching ends do not).
pub fn ranges_overlap(a: &Range<f64>, b: &Range<f64>) -> bool {
    a.start < b.end - TIME_EPSILON && b.start < a.end - TIME_EPSILON
}
