//! Frame compositor: paints the active layers of one output frame onto a
//! [`Surface`], back to front.
//!
//! Each layer is resolved to its pixels first (media frame, sticker image,
//! pre-rendered component frame) and then drawn. A layer that cannot be
//! resolved or drawn is skipped and reported; the frame carries on.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use image::RgbaImage;
use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::timing::{frame_to_time, time_to_frame};
use qcut_timeline::{
    CaptionPayload, ElementId, ElementKind, MediaPayload, StickerPayload, TextPayload, TextStyle,
};
use serde::Serialize;

use crate::cache::ImageCache;
use crate::planner::PlannedLayer;
use crate::prerender::PrerenderedFrames;
use crate::sources::{select_playable_source, MediaProvider, OverlayLookup};

/// Reference canvas height for text sizes.
const TEXT_REFERENCE_HEIGHT: f64 = 1080.0;

/// 2D drawing target with canvas-style state.
///
/// `save`/`restore` push and pop the transform and global alpha;
/// `translate` and `rotate` compose onto the current transform.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Reset pixels and drawing state for a new frame.
    fn clear(&mut self);

    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, x: f64, y: f64);
    /// Rotate by `radians`, clockwise in screen space.
    fn rotate(&mut self, radians: f64);
    fn set_global_alpha(&mut self, alpha: f64);

    /// Draw `image` scaled into the rectangle `(x, y, width, height)` in
    /// the current transform.
    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> QcutResult<()>;

    /// Draw `text` centered on `(x, y)` in the current transform.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) -> QcutResult<()>;
}

/// A layer that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFailure {
    pub element_id: ElementId,
    pub reason: String,
}

/// Outcome of compositing one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeReport {
    pub attempted: usize,
    pub successful: usize,
    pub failed: Vec<ElementFailure>,
}

/// Resolves layer resources and draws them.
pub struct FrameCompositor {
    media: Arc<dyn MediaProvider>,
    overlays: Arc<dyn OverlayLookup>,
    cache: Arc<ImageCache>,
    allow_list: Vec<String>,
    prerendered: HashMap<ElementId, PrerenderedFrames>,
}

impl FrameCompositor {
    pub fn new(
        media: Arc<dyn MediaProvider>,
        overlays: Arc<dyn OverlayLookup>,
        cache: Arc<ImageCache>,
    ) -> Self {
        Self {
            media,
            overlays,
            cache,
            allow_list: Vec::new(),
            prerendered: HashMap::new(),
        }
    }

    /// Remote origins media may be loaded from.
    pub fn with_allow_list(mut self, allow_list: Vec<String>) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Frames produced by the pre-render phase, by element id.
    pub fn with_prerendered(mut self, frames: HashMap<ElementId, PrerenderedFrames>) -> Self {
        self.prerendered = frames;
        self
    }

    /// Draw `layers` (already in draw order) for output frame `frame`.
    ///
    /// Element-level errors skip their layer and are reported; any other
    /// error is returned. The surface is not cleared here.
    pub async fn composite_frame<S: Surface + Send>(
        &self,
        surface: &mut S,
        layers: &[&PlannedLayer],
        frame: u64,
        fps: u32,
    ) -> QcutResult<CompositeReport> {
        let mut report = CompositeReport::default();
        for layer in layers {
            report.attempted += 1;
            let outcome = match self.resolve(layer, frame, fps).await {
                Ok(content) => draw_layer(surface, layer, content.as_deref()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.successful += 1,
                Err(e) if !e.is_element_level() => {
                    tracing::error!(element = %layer.element.id, frame, error = %e, "Compositing fault");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(element = %layer.element.id, frame, error = %e, "Layer skipped");
                    report.failed.push(ElementFailure {
                        element_id: layer.element.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Pixels for an image-backed layer; `None` for text layers.
    async fn resolve(
        &self,
        layer: &PlannedLayer,
        frame: u64,
        fps: u32,
    ) -> QcutResult<Option<Arc<RgbaImage>>> {
        match &layer.element.kind {
            ElementKind::Media(media) => {
                let time = frame_to_time(frame, fps);
                let source_time = layer.element.source_time_at(time);
                self.media_frame(media, source_time, fps).await.map(Some)
            }
            ElementKind::Sticker(sticker) => self.sticker_image(sticker).await.map(Some),
            ElementKind::OverlayComponent(_) => {
                self.prerendered_frame(&layer.element.id, frame).await.map(Some)
            }
            ElementKind::Text(_) | ElementKind::Caption(_) => Ok(None),
            ElementKind::Audio(_) => Err(QcutError::unsupported("audio elements are not drawn")),
        }
    }

    async fn media_frame(
        &self,
        media: &MediaPayload,
        source_time: f64,
        fps: u32,
    ) -> QcutResult<Arc<RgbaImage>> {
        let info = self.media.media(&media.media_id).await.ok_or_else(|| {
            QcutError::resource_unavailable(format!("media {} not found", media.media_id))
        })?;
        let source = select_playable_source(&info, &self.allow_list).ok_or_else(|| {
            QcutError::resource_unavailable(format!("no playable source for {}", media.media_id))
        })?;

        let key = format!("{}#{}", source.cache_key(), time_to_frame(source_time, fps));
        if let Some(image) = self.cache.get(&key) {
            return Ok(image);
        }
        let image = Arc::new(self.media.load_frame(&source, source_time).await?);
        self.cache.insert(key, image.clone());
        Ok(image)
    }

    async fn sticker_image(&self, sticker: &StickerPayload) -> QcutResult<Arc<RgbaImage>> {
        let key = format!("overlay:{}", sticker.media_item_id);
        if let Some(image) = self.cache.get(&key) {
            return Ok(image);
        }
        let image = self
            .overlays
            .load_overlay(&sticker.media_item_id)
            .await?
            .ok_or_else(|| {
                QcutError::resource_unavailable(format!(
                    "sticker image {} not found",
                    sticker.media_item_id
                ))
            })?;
        let image = Arc::new(image);
        self.cache.insert(key, image.clone());
        Ok(image)
    }

    async fn prerendered_frame(&self, element_id: &str, frame: u64) -> QcutResult<Arc<RgbaImage>> {
        let path = self
            .prerendered
            .get(element_id)
            .and_then(|frames| frames.path_for(frame))
            .ok_or_else(|| {
                QcutError::resource_unavailable(format!(
                    "no pre-rendered frame {frame} for {element_id}"
                ))
            })?
            .to_path_buf();

        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| QcutError::render(format!("frame decode task failed: {e}")))?
            .map_err(|e| QcutError::render(format!("failed to read pre-rendered frame: {e}")))?;
        Ok(Arc::new(decoded.into_rgba8()))
    }
}

fn draw_layer<S: Surface + ?Sized>(
    surface: &mut S,
    layer: &PlannedLayer,
    image: Option<&RgbaImage>,
) -> QcutResult<()> {
    match (&layer.element.kind, image) {
        (ElementKind::Sticker(sticker), Some(image)) => draw_sticker(surface, sticker, image),
        (ElementKind::Media(_) | ElementKind::OverlayComponent(_), Some(image)) => {
            draw_fitted(surface, image)
        }
        (ElementKind::Text(text), _) => draw_text(surface, text),
        (ElementKind::Caption(caption), _) => draw_caption(surface, caption),
        _ => Err(QcutError::render(format!(
            "no drawable content for {}",
            layer.element.id
        ))),
    }
}

/// Largest rectangle with the source aspect ratio that fits the canvas,
/// centered. Returns `(x, y, width, height)`.
pub fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (f64, f64, f64, f64) {
    if src_w == 0 || src_h == 0 {
        return (0.0, 0.0, dst_w as f64, dst_h as f64);
    }
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let w = src_w as f64 * scale;
    let h = src_h as f64 * scale;
    ((dst_w as f64 - w) / 2.0, (dst_h as f64 - h) / 2.0, w, h)
}

/// Draw a full-frame image letterboxed to the canvas.
pub fn draw_fitted<S: Surface + ?Sized>(surface: &mut S, image: &RgbaImage) -> QcutResult<()> {
    let (x, y, w, h) = fit_rect(image.width(), image.height(), surface.width(), surface.height());
    surface.draw_image(image, x, y, w, h)
}

/// Draw a sticker: centered at its percent position, sized in percent of
/// the shorter canvas side, rotated about its center.
pub fn draw_sticker<S: Surface + ?Sized>(
    surface: &mut S,
    sticker: &StickerPayload,
    image: &RgbaImage,
) -> QcutResult<()> {
    let canvas_w = surface.width() as f64;
    let canvas_h = surface.height() as f64;
    let min_side = canvas_w.min(canvas_h);

    let width = sticker.size.width / 100.0 * min_side;
    let height = sticker.size.height / 100.0 * min_side;
    let cx = sticker.position.x / 100.0 * canvas_w;
    let cy = sticker.position.y / 100.0 * canvas_h;

    surface.save();
    surface.set_global_alpha(sticker.opacity.clamp(0.0, 1.0));
    surface.translate(cx, cy);
    if sticker.rotation != 0.0 {
        surface.rotate(sticker.rotation * PI / 180.0);
    }
    let result = surface.draw_image(image, -width / 2.0, -height / 2.0, width, height);
    surface.restore();
    result
}

fn scaled_style<S: Surface + ?Sized>(surface: &S, style: &TextStyle) -> TextStyle {
    let mut scaled = style.clone();
    scaled.font_size = style.font_size * surface.height() as f64 / TEXT_REFERENCE_HEIGHT;
    scaled
}

/// Draw a text element centered at its percent position.
pub fn draw_text<S: Surface + ?Sized>(surface: &mut S, text: &TextPayload) -> QcutResult<()> {
    let style = scaled_style(surface, &text.style);
    let cx = text.x / 100.0 * surface.width() as f64;
    let cy = text.y / 100.0 * surface.height() as f64;

    surface.save();
    surface.set_global_alpha(text.opacity.clamp(0.0, 1.0));
    surface.translate(cx, cy);
    if text.rotation != 0.0 {
        surface.rotate(text.rotation * PI / 180.0);
    }
    let result = surface.fill_text(&text.content, 0.0, 0.0, &style);
    surface.restore();
    result
}

/// Draw a caption centered horizontally at its `y`.
pub fn draw_caption<S: Surface + ?Sized>(
    surface: &mut S,
    caption: &CaptionPayload,
) -> QcutResult<()> {
    let style = scaled_style(surface, &caption.style);
    let cx = surface.width() as f64 / 2.0;
    let cy = caption.y / 100.0 * surface.height() as f64;

    surface.save();
    surface.translate(cx, cy);
    let result = surface.fill_text(&caption.text, 0.0, 0.0, &style);
    surface.restore();
    result
}
