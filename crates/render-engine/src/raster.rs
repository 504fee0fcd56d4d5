//! Software [`Surface`] over an RGBA buffer.
//!
//! Images are warped through the current transform with nearest-neighbour
//! sampling, then blended source-over with the global alpha. Text is laid
//! out into an offscreen block with the resolved font face and drawn like
//! any other image, so it follows the same transform and alpha.

use std::sync::Arc;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::{TextAlign, TextStyle};

use crate::components::parse_color;
use crate::compositor::Surface;
use crate::fonts::FontBook;

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy)]
struct DrawState {
    transform: Projection,
    alpha: f64,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Projection::translate(0.0, 0.0),
            alpha: 1.0,
        }
    }
}

/// RGBA canvas cleared to an opaque background each frame.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
    /// Warp target, same size as `pixels`.
    scratch: RgbaImage,
    background: Rgba<u8>,
    fonts: Arc<FontBook>,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl RasterSurface {
    /// Canvas of `width` x `height`, cleared to opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(width, height, Rgba([0, 0, 0, 255]))
    }

    pub fn with_background(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, background),
            scratch: RgbaImage::new(width, height),
            background,
            fonts: FontBook::global(),
            state: DrawState::default(),
            stack: Vec::new(),
        }
    }

    /// Use `fonts` for text instead of the shared book.
    pub fn with_fonts(mut self, fonts: Arc<FontBook>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Number of saved states not yet restored.
    pub fn save_depth(&self) -> usize {
        self.stack.len()
    }
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = self.background;
        }
        self.state = DrawState::default();
        self.stack.clear();
    }

    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.state.transform = self.state.transform * Projection::translate(x as f32, y as f32);
    }

    fn rotate(&mut self, radians: f64) {
        self.state.transform = self.state.transform * Projection::rotate(radians as f32);
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> QcutResult<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(QcutError::render("cannot draw an empty image"));
        }
        if width <= 0.0 || height <= 0.0 || self.state.alpha <= 0.0 {
            return Ok(());
        }

        // Image pixel space to canvas space.
        let placement = self.state.transform
            * Projection::translate(x as f32, y as f32)
            * Projection::scale(
                (width / image.width() as f64) as f32,
                (height / image.height() as f64) as f32,
            );

        // Device-space bounding box of the destination rectangle.
        let (iw, ih) = (image.width() as f32, image.height() as f32);
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for corner in [(0.0, 0.0), (iw, 0.0), (0.0, ih), (iw, ih)] {
            let (cx, cy) = placement * corner;
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);
        }
        let canvas_w = self.pixels.width() as f32;
        let canvas_h = self.pixels.height() as f32;
        let x0 = min_x.floor().clamp(0.0, canvas_w) as u32;
        let y0 = min_y.floor().clamp(0.0, canvas_h) as u32;
        let x1 = max_x.ceil().clamp(0.0, canvas_w) as u32;
        let y1 = max_y.ceil().clamp(0.0, canvas_h) as u32;
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        // Sample at pixel centers.
        let projection =
            Projection::translate(-0.5, -0.5) * placement * Projection::translate(0.5, 0.5);
        warp_into(image, &projection, Interpolation::Nearest, CLEAR, &mut self.scratch);

        let alpha = self.state.alpha;
        for py in y0..y1 {
            for px in x0..x1 {
                let src = *self.scratch.get_pixel(px, py);
                blend_over(self.pixels.get_pixel_mut(px, py), &src, alpha);
            }
        }
        Ok(())
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) -> QcutResult<()> {
        if text.trim().is_empty() || style.font_size <= 0.0 || self.state.alpha <= 0.0 {
            return Ok(());
        }
        let font = self.fonts.resolve(&style.font_family).cloned().ok_or_else(|| {
            QcutError::resource_unavailable(format!("no font for '{}'", style.font_family))
        })?;
        let color = parse_color(&style.color)
            .ok_or_else(|| QcutError::render(format!("invalid text color '{}'", style.color)))?;
        let background = parse_color(&style.background_color).filter(|c| c[3] > 0);

        let block = layout_text(&font, text, style.font_size as f32, style.align, color, background);
        let w = block.image.width() as f64;
        let h = block.image.height() as f64;
        let pad = block.pad as f64;
        let left = match style.align {
            TextAlign::Left => x - pad,
            TextAlign::Center => x - w / 2.0,
            TextAlign::Right => x - block.content_width as f64 - pad,
        };
        self.draw_image(&block.image, left, y - h / 2.0, w, h)
    }
}

/// Text rendered into its own transparent image.
struct TextBlock {
    image: RgbaImage,
    /// Margin around the glyph area on every side.
    pad: u32,
    /// Width of the widest line.
    content_width: u32,
}

/// Lay out `text` line by line, aligned within the block.
fn layout_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    align: TextAlign,
    color: Rgba<u8>,
    background: Option<Rgba<u8>>,
) -> TextBlock {
    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);
    let line_height = (scaled.height() + scaled.line_gap()).ceil().max(1.0);
    let pad = (font_size * 0.1).ceil() as u32 + 1;

    let lines: Vec<(&str, u32)> = text
        .lines()
        .map(|line| (line, text_size(scale, font, line).0))
        .collect();
    let content_width = lines.iter().map(|(_, w)| *w).max().unwrap_or(0).max(1);
    let content_height = (line_height * lines.len().max(1) as f32).ceil() as u32;

    // Glyph edges blend towards the text color, not towards black.
    let base = background.unwrap_or(Rgba([color[0], color[1], color[2], 0]));
    let mut image = RgbaImage::from_pixel(content_width + 2 * pad, content_height + 2 * pad, base);
    for (i, (line, line_width)) in lines.iter().enumerate() {
        let offset = match align {
            TextAlign::Left => 0,
            TextAlign::Center => (content_width - line_width) / 2,
            TextAlign::Right => content_width - line_width,
        };
        let top = pad as f32 + line_height * i as f32;
        draw_text_mut(
            &mut image,
            color,
            (pad + offset) as i32,
            top as i32,
            scale,
            font,
            line,
        );
    }

    TextBlock {
        image,
        pad,
        content_width,
    }
}

/// Source-over blend of `src` (scaled by `alpha`) onto `dst`.
fn blend_over(dst: &mut Rgba<u8>, src: &Rgba<u8>, alpha: f64) {
    let sa = src[3] as f64 / 255.0 * alpha;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = CLEAR;
        return;
    }
    for i in 0..3 {
        let s = src[i] as f64 / 255.0;
        let d = dst[i] as f64 / 255.0;
        let out = (s * sa + d * da * (1.0 - sa)) / out_a;
        dst[i] = (out * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
