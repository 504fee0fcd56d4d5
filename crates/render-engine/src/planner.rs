//! Export planning: which elements draw on which frames, and in what order.
//!
//! The planner reads an immutable timeline snapshot and produces a
//! [`RenderPlan`]. Nothing downstream looks at the timeline again.

use std::ops::Range;

use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::timing::{active_frame_range, frame_count};
use qcut_timeline::{Element, ElementKind, ExportSettings, Timeline, TrackId};

/// Draw band. Track content is painted first, stickers on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerBand {
    TrackContent = 0,
    Sticker = 1,
}

/// Back-to-front ordering key: band, then z value, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerKey {
    pub band: LayerBand,
    /// Track index for track content, `zIndex` for stickers.
    pub z: i64,
    /// Position of the element in timeline storage order.
    pub seq: usize,
}

/// An element scheduled for drawing.
#[derive(Debug, Clone)]
pub struct PlannedLayer {
    pub element: Element,
    pub track_id: TrackId,
    pub track_index: usize,
    /// Output frames `[first, end)` on which the element is visible.
    pub active_frames: Range<u64>,
    pub key: LayerKey,
    /// Rendered frame-by-frame by a component before compositing.
    pub dynamic: bool,
}

impl PlannedLayer {
    pub fn is_active_at(&self, frame: u64) -> bool {
        self.active_frames.contains(&frame)
    }

    pub fn frame_count(&self) -> u64 {
        self.active_frames.end - self.active_frames.start
    }
}

/// Everything the pipeline needs to render a timeline.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub settings: ExportSettings,
    pub total_duration: f64,
    pub total_frames: u64,
    /// Visual layers sorted back-to-front by [`LayerKey`].
    pub layers: Vec<PlannedLayer>,
    pub requires_dynamic_prerender: bool,
}

impl RenderPlan {
    /// Layers visible on `frame`, in draw order.
    pub fn active_at(&self, frame: u64) -> Vec<&PlannedLayer> {
        self.layers.iter().filter(|l| l.is_active_at(frame)).collect()
    }

    /// Layers that need pre-rendering.
    pub fn dynamic_layers(&self) -> impl Iterator<Item = &PlannedLayer> {
        self.layers.iter().filter(|l| l.dynamic)
    }

    /// Sum of active frames over all dynamic layers.
    pub fn dynamic_frame_total(&self) -> u64 {
        self.dynamic_layers().map(PlannedLayer::frame_count).sum()
    }
}

/// Build a render plan from a timeline snapshot.
pub fn plan_export(timeline: &Timeline, settings: &ExportSettings) -> QcutResult<RenderPlan> {
    if settings.fps == 0 {
        return Err(QcutError::planning("frame rate must be greater than zero"));
    }
    if settings.width == 0 || settings.height == 0 {
        return Err(QcutError::planning(format!(
            "invalid output size {}x{}",
            settings.width, settings.height
        )));
    }

    let total_duration = timeline.total_duration();
    if total_duration <= 0.0 {
        return Err(QcutError::planning("timeline has no content to export"));
    }
    let total_frames = frame_count(total_duration, settings.fps);

    let mut layers = Vec::new();
    let mut seq = 0usize;
    for (track_index, track) in timeline.tracks.iter().enumerate() {
        for element in &track.elements {
            let this_seq = seq;
            seq += 1;

            if !element.kind.is_visual() {
                continue;
            }
            let effective = element.effective_duration();
            if effective <= 0.0 {
                tracing::debug!(element = %element.id, "Skipping element with empty effective range");
                continue;
            }

            let active_frames = active_frame_range(element.start_time, effective, settings.fps);
            if active_frames.is_empty() {
                continue;
            }

            let key = match &element.kind {
                ElementKind::Sticker(sticker) => LayerKey {
                    band: LayerBand::Sticker,
                    z: sticker.z_index as i64,
                    seq: this_seq,
                },
                _ => LayerKey {
                    band: LayerBand::TrackContent,
                    z: track_index as i64,
                    seq: this_seq,
                },
            };

            layers.push(PlannedLayer {
                element: element.clone(),
                track_id: track.id.clone(),
                track_index,
                active_frames,
                key,
                dynamic: element.kind.is_dynamic(),
            });
        }
    }

    layers.sort_by_key(|l| l.key);
    let requires_dynamic_prerender = layers.iter().any(|l| l.dynamic);

    tracing::info!(
        total_duration,
        total_frames,
        layers = layers.len(),
        dynamic = requires_dynamic_prerender,
        "Export planned"
    );

    Ok(RenderPlan {
        settings: settings.clone(),
        total_duration,
        total_frames,
        layers,
        requires_dynamic_prerender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_timeline::TrackKind;

    fn settings() -> ExportSettings {
        ExportSettings::new(640, 360, 30)
    }

    #[test]
    fn test_total_frames_from_effective_duration() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline
            .add_element(&main, Element::media("m1", 5.0, 12.0).with_trim(1.0, 1.0))
            .unwrap();

        let plan = plan_export(&timeline, &settings()).unwrap();
        assert_eq!(plan.total_duration, 15.0);
        assert_eq!(plan.total_frames, 450);
        assert_eq!(plan.layers[0].active_frames, 150..450);
        assert!(!plan.requires_dynamic_prerender);
    }

    #[test]
    fn test_fatal_settings() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline.add_element(&main, Element::media("m1", 0.0, 1.0)).unwrap();

        let mut zero_fps = settings();
        zero_fps.fps = 0;
        assert!(matches!(
            plan_export(&timeline, &zero_fps),
            Err(QcutError::Planning { .. })
        ));

        let mut zero_width = settings();
        zero_width.width = 0;
        assert!(plan_export(&timeline, &zero_width).is_err());

        assert!(plan_export(&Timeline::with_main_track(), &settings()).is_err());
    }

    #[test]
    fn test_audio_is_not_a_layer_but_counts_for_duration() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline
            .add_element(&main, Element::media("m1", 0.0, 2.0).with_id("clip"))
            .unwrap();
        let audio_id = timeline.separate_audio(&main, "clip").unwrap();
        let audio = timeline.first_track_of(TrackKind::Audio).unwrap().id.clone();
        assert!(timeline.move_element(&audio, &audio_id, 3.0));

        let plan = plan_export(&timeline, &settings()).unwrap();
        assert_eq!(plan.layers.len(), 1);
        assert_eq!(plan.total_duration, 5.0);
    }

    #[test]
    fn test_layer_order_bands_then_z_then_insertion() {
        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        let stickers = timeline.add_track(TrackKind::Sticker, "Stickers");
        let text = timeline.add_track(TrackKind::Text, "Text");

        timeline
            .add_element(&stickers, Element::sticker("s", 0.0, 1.0, 5).with_id("high"))
            .unwrap();
        timeline
            .add_element(&stickers, Element::sticker("s", 0.0, 1.0, 1).with_id("low"))
            .unwrap();
        timeline
            .add_element(&stickers, Element::sticker("s", 0.0, 1.0, 1).with_id("low-later"))
            .unwrap();
        timeline
            .add_element(&text, Element::text("hello", 0.0, 1.0).with_id("title"))
            .unwrap();
        timeline
            .add_element(&main, Element::media("m", 0.0, 1.0).with_id("video"))
            .unwrap();

        let plan = plan_export(&timeline, &settings()).unwrap();
        let order: Vec<&str> = plan
            .active_at(0)
            .iter()
            .map(|l| l.element.id.as_str())
            .collect();
        assert_eq!(order, vec!["video", "title", "low", "low-later", "high"]);
    }

    #[test]
    fn test_component_marks_plan_dynamic() {
        let mut timeline = Timeline::with_main_track();
        let overlays = timeline.add_track(TrackKind::OverlayComponent, "Overlays");
        timeline
            .add_element(
                &overlays,
                Element::component("progress-bar", serde_json::json!({}), 1.0, 2.0),
            )
            .unwrap();

        let plan = plan_export(&timeline, &settings()).unwrap();
        assert!(plan.requires_dynamic_prerender);
        assert_eq!(plan.dynamic_frame_total(), 60);
        assert!(plan.active_at(29).is_empty());
        assert_eq!(plan.active_at(30).len(), 1);
    }
}
