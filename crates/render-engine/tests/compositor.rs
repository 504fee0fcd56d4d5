//! Compositor behaviour against a recording surface.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use proptest::prelude::*;
use qcut_common::error::{QcutError, QcutResult};
use qcut_render_engine::compositor::fit_rect;
use qcut_render_engine::sources::NoMedia;
use qcut_render_engine::{
    plan_export, FrameCompositor, ImageCache, MediaInfo, MediaProvider, MediaSource,
    OverlayLookup, PlayableSource, RasterSurface, Surface,
};
use qcut_timeline::{Element, ElementKind, ExportSettings, TextStyle, Timeline, TrackKind};

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Save,
    Restore,
    Translate(f64, f64),
    Rotate(f64),
    Alpha(f64),
    Draw([u8; 4]),
    Text(String),
}

struct RecordingSurface {
    ops: Vec<Op>,
}

impl RecordingSurface {
    fn new() -> Self {
        Self { ops: Vec::new() }
    }

    fn draws(&self) -> Vec<[u8; 4]> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Draw(color) => Some(*color),
                _ => None,
            })
            .collect()
    }

    fn rotations(&self) -> Vec<f64> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Rotate(r) => Some(*r),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        200
    }

    fn height(&self) -> u32 {
        100
    }

    fn clear(&mut self) {
        self.ops.clear();
    }

    fn save(&mut self) {
        self.ops.push(Op::Save);
    }

    fn restore(&mut self) {
        self.ops.push(Op::Restore);
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.ops.push(Op::Translate(x, y));
    }

    fn rotate(&mut self, radians: f64) {
        self.ops.push(Op::Rotate(radians));
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.ops.push(Op::Alpha(alpha));
    }

    fn draw_image(
        &mut self,
        image: &RgbaImage,
        _x: f64,
        _y: f64,
        _width: f64,
        _height: f64,
    ) -> QcutResult<()> {
        self.ops.push(Op::Draw(image.get_pixel(0, 0).0));
        Ok(())
    }

    fn fill_text(&mut self, text: &str, _x: f64, _y: f64, _style: &TextStyle) -> QcutResult<()> {
        self.ops.push(Op::Text(text.to_string()));
        Ok(())
    }
}

/// Sticker images and media frames keyed by id, each a 1x1 solid color.
#[derive(Default)]
struct FakeLibrary {
    overlays: HashMap<String, [u8; 4]>,
    media: HashMap<String, [u8; 4]>,
}

#[async_trait::async_trait]
impl OverlayLookup for FakeLibrary {
    async fn load_overlay(&self, media_item_id: &str) -> QcutResult<Option<RgbaImage>> {
        Ok(self
            .overlays
            .get(media_item_id)
            .map(|color| RgbaImage::from_pixel(1, 1, Rgba(*color))))
    }
}

#[async_trait::async_trait]
impl MediaProvider for FakeLibrary {
    async fn media(&self, media_id: &str) -> Option<MediaInfo> {
        self.media.get(media_id).map(|_| MediaInfo {
            id: media_id.to_string(),
            duration: 10.0,
            width: 1,
            height: 1,
            sources: vec![MediaSource::Local(PathBuf::from(format!("/media/{media_id}.png")))],
        })
    }

    async fn load_frame(&self, source: &PlayableSource, _source_time: f64) -> QcutResult<RgbaImage> {
        let color = self.media[&source.media_id];
        Ok(RgbaImage::from_pixel(1, 1, Rgba(color)))
    }
}

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn compositor(library: FakeLibrary) -> FrameCompositor {
    let library = Arc::new(library);
    FrameCompositor::new(
        library.clone(),
        library,
        Arc::new(ImageCache::new(16)),
    )
}

fn settings() -> ExportSettings {
    ExportSettings::new(200, 100, 10)
}

#[tokio::test]
async fn test_draws_back_to_front() {
    let mut timeline = Timeline::new();
    // Sticker track sits below the media track, stickers still draw on top.
    let stickers = timeline.add_track(TrackKind::Sticker, "Stickers");
    let video = timeline.add_track(TrackKind::Media, "Video");
    timeline
        .add_element(&stickers, Element::sticker("top", 0.0, 1.0, 5))
        .unwrap();
    timeline
        .add_element(&stickers, Element::sticker("low", 0.0, 1.0, 1))
        .unwrap();
    timeline
        .add_element(&stickers, Element::sticker("mid", 0.0, 1.0, 3))
        .unwrap();
    timeline
        .add_element(&video, Element::media("clip", 0.0, 1.0))
        .unwrap();

    let library = FakeLibrary {
        overlays: HashMap::from([
            ("top".to_string(), RED),
            ("low".to_string(), GREEN),
            ("mid".to_string(), BLUE),
        ]),
        media: HashMap::from([("clip".to_string(), WHITE)]),
    };
    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    let report = compositor(library)
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    assert_eq!(report.attempted, 4);
    assert_eq!(report.successful, 4);
    assert_eq!(surface.draws(), vec![WHITE, GREEN, BLUE, RED]);
}

#[tokio::test]
async fn test_missing_sticker_is_skipped() {
    let mut timeline = Timeline::new();
    let track = timeline.add_track(TrackKind::Sticker, "Stickers");
    timeline
        .add_element(&track, Element::sticker("first", 0.0, 1.0, 0).with_id("s1"))
        .unwrap();
    timeline
        .add_element(&track, Element::sticker("gone", 0.0, 1.0, 1).with_id("s2"))
        .unwrap();
    timeline
        .add_element(&track, Element::sticker("third", 0.0, 1.0, 2).with_id("s3"))
        .unwrap();

    let library = FakeLibrary {
        overlays: HashMap::from([("first".to_string(), RED), ("third".to_string(), BLUE)]),
        ..FakeLibrary::default()
    };
    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    let report = compositor(library)
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].element_id, "s2");
    assert_eq!(surface.draws(), vec![RED, BLUE]);
}

#[tokio::test]
async fn test_rotation_applied_only_when_nonzero() {
    let mut timeline = Timeline::new();
    let track = timeline.add_track(TrackKind::Sticker, "Stickers");
    let mut tilted = Element::sticker("tilted", 0.0, 1.0, 1);
    if let ElementKind::Sticker(sticker) = &mut tilted.kind {
        sticker.rotation = 90.0;
        sticker.opacity = 0.5;
    }
    timeline
        .add_element(&track, Element::sticker("flat", 0.0, 1.0, 0))
        .unwrap();
    timeline.add_element(&track, tilted).unwrap();

    let library = FakeLibrary {
        overlays: HashMap::from([("flat".to_string(), RED), ("tilted".to_string(), GREEN)]),
        ..FakeLibrary::default()
    };
    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    compositor(library)
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    let rotations = surface.rotations();
    assert_eq!(rotations.len(), 1);
    assert!((rotations[0] - FRAC_PI_2).abs() < 1e-9);

    // Each sticker is wrapped in save/restore with its own alpha and a
    // translate to its center.
    assert_eq!(
        surface.ops[..5],
        [
            Op::Save,
            Op::Alpha(1.0),
            Op::Translate(100.0, 50.0),
            Op::Draw(RED),
            Op::Restore,
        ]
    );
    assert_eq!(surface.ops[5..7], [Op::Save, Op::Alpha(0.5)]);
    assert_eq!(surface.ops.last(), Some(&Op::Restore));
}

#[tokio::test]
async fn test_text_and_caption_go_through_fill_text() {
    let mut timeline = Timeline::new();
    let text = timeline.add_track(TrackKind::Text, "Text");
    let captions = timeline.add_track(TrackKind::Caption, "Captions");
    timeline
        .add_element(&text, Element::text("Title", 0.0, 1.0))
        .unwrap();
    timeline
        .add_element(&captions, Element::caption("hello there", 0.0, 1.0))
        .unwrap();

    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    let report = compositor(FakeLibrary::default())
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    assert_eq!(report.successful, 2);
    let texts: Vec<&Op> = surface
        .ops
        .iter()
        .filter(|op| matches!(op, Op::Text(_)))
        .collect();
    assert_eq!(
        texts,
        vec![&Op::Text("Title".to_string()), &Op::Text("hello there".to_string())]
    );
    // Caption is centered horizontally at 90% height.
    assert!(surface.ops.contains(&Op::Translate(100.0, 90.0)));
}

#[tokio::test]
async fn test_unknown_media_is_element_failure() {
    let mut timeline = Timeline::with_main_track();
    let main = timeline.main_track().unwrap().id.clone();
    timeline
        .add_element(&main, Element::media("missing", 0.0, 1.0).with_id("m1"))
        .unwrap();

    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    let report = compositor(FakeLibrary::default())
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    assert_eq!(report.successful, 0);
    assert_eq!(report.failed[0].element_id, "m1");
    assert!(surface.draws().is_empty());
}

/// Overlay store whose backing disk is gone.
struct UnreadableOverlays;

#[async_trait::async_trait]
impl OverlayLookup for UnreadableOverlays {
    async fn load_overlay(&self, _media_item_id: &str) -> QcutResult<Option<RgbaImage>> {
        Err(QcutError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "overlay store unreadable",
        )))
    }
}

#[tokio::test]
async fn test_non_element_error_stops_the_frame() {
    let mut timeline = Timeline::new();
    let track = timeline.add_track(TrackKind::Sticker, "Stickers");
    timeline
        .add_element(&track, Element::sticker("a", 0.0, 1.0, 0))
        .unwrap();
    timeline
        .add_element(&track, Element::sticker("b", 0.0, 1.0, 1))
        .unwrap();

    let compositor = FrameCompositor::new(
        Arc::new(NoMedia),
        Arc::new(UnreadableOverlays),
        Arc::new(ImageCache::new(4)),
    );
    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RecordingSurface::new();
    let err = compositor
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, QcutError::Io(_)));
    assert!(surface.draws().is_empty());
}

#[tokio::test]
async fn test_text_layers_paint_raster_pixels() {
    let mut timeline = Timeline::new();
    let text = timeline.add_track(TrackKind::Text, "Text");
    let captions = timeline.add_track(TrackKind::Caption, "Captions");
    let mut title = Element::text("Title", 0.0, 1.0).with_id("t1");
    if let ElementKind::Text(payload) = &mut title.kind {
        payload.style.font_size = 240.0;
        payload.y = 30.0;
    }
    let mut caption = Element::caption("subtitle", 0.0, 1.0).with_id("c1");
    if let ElementKind::Caption(payload) = &mut caption.kind {
        payload.style.font_size = 180.0;
    }
    timeline.add_element(&text, title).unwrap();
    timeline.add_element(&captions, caption).unwrap();

    let plan = plan_export(&timeline, &settings()).unwrap();
    let mut surface = RasterSurface::new(200, 100);
    let report = compositor(FakeLibrary::default())
        .composite_frame(&mut surface, &plan.active_at(0), 0, 10)
        .await
        .unwrap();

    assert_eq!(report.successful, 2, "{:?}", report.failed);
    let lit_rows: Vec<u32> = (0..100)
        .filter(|&y| (0..200).any(|x| surface.image().get_pixel(x, y)[0] > 128))
        .collect();
    // Title around 30% height, caption around 90%.
    assert!(lit_rows.iter().any(|&y| (20..40).contains(&y)), "{lit_rows:?}");
    assert!(lit_rows.iter().any(|&y| y >= 80), "{lit_rows:?}");
}

proptest! {
    #[test]
    fn prop_fit_rect_stays_inside_canvas(
        src_w in 1u32..4000,
        src_h in 1u32..4000,
        dst_w in 1u32..4000,
        dst_h in 1u32..4000,
    ) {
        let (x, y, w, h) = fit_rect(src_w, src_h, dst_w, dst_h);
        prop_assert!(x >= -1e-6 && y >= -1e-6);
        prop_assert!(x + w <= dst_w as f64 + 1e-6);
        prop_assert!(y + h <= dst_h as f64 + 1e-6);
        // One axis always fills the canvas.
        prop_assert!((w - dst_w as f64).abs() < 1e-6 || (h - dst_h as f64).abs() < 1e-6);
        let src_ratio = src_w as f64 / src_h as f64;
        prop_assert!((w / h - src_ratio).abs() / src_ratio < 1e-9);
    }
}
