//! Procedural overlay components.
//!
//! A component renders one RGBA frame at a time from a JSON props object.
//! Element props are merged over the component's defaults before
//! rendering. Two components ship with the engine: `solid-color` and
//! `progress-bar`.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use qcut_common::error::{QcutError, QcutResult};
use serde_json::Value;

/// Static description of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMeta {
    /// Length of one pass of the component. Frames past it hold the last one.
    pub duration_in_frames: u64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub default_props: Value,
}

/// A component that can render frames.
#[async_trait::async_trait]
pub trait DynamicComponent: Send + Sync {
    fn meta(&self) -> ComponentMeta;

    /// Render component frame `frame` with merged `props`.
    async fn render_frame(&self, frame: u64, props: &Value) -> QcutResult<RgbaImage>;
}

/// Lookup of components by id.
pub trait ComponentRegistry: Send + Sync {
    fn get(&self, component_id: &str) -> Option<Arc<dyn DynamicComponent>>;
}

/// In-memory registry.
#[derive(Default, Clone)]
pub struct StaticComponentRegistry {
    components: HashMap<String, Arc<dyn DynamicComponent>>,
}

impl StaticComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in components.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SolidColor::ID, Arc::new(SolidColor::default()));
        registry.register(ProgressBar::ID, Arc::new(ProgressBar::default()));
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, component: Arc<dyn DynamicComponent>) {
        self.components.insert(id.into(), component);
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.components.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl ComponentRegistry for StaticComponentRegistry {
    fn get(&self, component_id: &str) -> Option<Arc<dyn DynamicComponent>> {
        self.components.get(component_id).cloned()
    }
}

/// Shallow merge: keys of `overrides` replace keys of `defaults`. A
/// non-object override is ignored.
pub fn merge_props(defaults: &Value, overrides: &Value) -> Value {
    let mut merged = match defaults {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Value::Object(extra) = overrides {
        for (key, value) in extra {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`. `transparent` is fully clear.
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("transparent") {
        return Some(Rgba([0, 0, 0, 0]));
    }
    let hex = value.strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut channels = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                channels[i] = v * 17;
            }
            Some(Rgba([channels[0], channels[1], channels[2], 255]))
        }
        6 => Some(Rgba([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            255,
        ])),
        8 => Some(Rgba([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ])),
        _ => None,
    }
}

fn color_prop(props: &Value, key: &str) -> QcutResult<Rgba<u8>> {
    let raw = props
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| QcutError::render(format!("missing color prop '{key}'")))?;
    parse_color(raw).ok_or_else(|| QcutError::render(format!("invalid color '{raw}' for '{key}'")))
}

/// Fills the frame with one color. Props: `color`.
#[derive(Debug, Clone)]
pub struct SolidColor {
    meta: ComponentMeta,
}

impl SolidColor {
    pub const ID: &'static str = "solid-color";
}

impl Default for SolidColor {
    fn default() -> Self {
        Self {
            meta: ComponentMeta {
                duration_in_frames: 1,
                fps: 30,
                width: 320,
                height: 180,
                default_props: serde_json::json!({ "color": "#000000" }),
            },
        }
    }
}

#[async_trait::async_trait]
impl DynamicComponent for SolidColor {
    fn meta(&self) -> ComponentMeta {
        self.meta.clone()
    }

    async fn render_frame(&self, _frame: u64, props: &Value) -> QcutResult<RgbaImage> {
        let color = color_prop(props, "color")?;
        Ok(RgbaImage::from_pixel(self.meta.width, self.meta.height, color))
    }
}

/// Horizontal bar that fills left to right over the component duration.
/// Props: `color`, `backgroundColor`, `thickness` (percent of height).
#[derive(Debug, Clone)]
pub struct ProgressBar {
    meta: ComponentMeta,
}

impl ProgressBar {
    pub const ID: &'static str = "progress-bar";
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            meta: ComponentMeta {
                duration_in_frames: 300,
                fps: 30,
                width: 1280,
                height: 720,
                default_props: serde_json::json!({
                    "color": "#ff3b30",
                    "backgroundColor": "transparent",
                    "thickness": 2.0
                }),
            },
        }
    }
}

#[async_trait::async_trait]
impl DynamicComponent for ProgressBar {
    fn meta(&self) -> ComponentMeta {
        self.meta.clone()
    }

    async fn render_frame(&self, frame: u64, props: &Value) -> QcutResult<RgbaImage> {
        let color = color_prop(props, "color")?;
        let background = color_prop(props, "backgroundColor")?;
        let thickness = props
            .get("thickness")
            .and_then(Value::as_f64)
            .unwrap_or(2.0)
            .clamp(0.0, 100.0);

        let (width, height) = (self.meta.width, self.meta.height);
        let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

        let bar_height = ((height as f64 * thickness / 100.0).round() as u32).clamp(1, height);
        let last = self.meta.duration_in_frames.saturating_sub(1).max(1);
        let fraction = (frame.min(last) as f64 / last as f64).clamp(0.0, 1.0);
        let filled = (width as f64 * fraction).round() as u32;

        for y in (height - bar_height)..height {
            for x in 0..width {
                let pixel = if x < filled { color } else { background };
                image.put_pixel(x, y, pixel);
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_color("#102030"), Some(Rgba([16, 32, 48, 255])));
        assert_eq!(parse_color("#10203080"), Some(Rgba([16, 32, 48, 128])));
        assert_eq!(parse_color("transparent"), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_color("#12345"), None);
    }

    #[test]
    fn test_merge_props_overrides_defaults() {
        let defaults = serde_json::json!({ "color": "#000", "thickness": 2 });
        let merged = merge_props(&defaults, &serde_json::json!({ "color": "#fff" }));
        assert_eq!(merged["color"], "#fff");
        assert_eq!(merged["thickness"], 2);

        let untouched = merge_props(&defaults, &Value::Null);
        assert_eq!(untouched, defaults);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = StaticComponentRegistry::with_builtins();
        assert_eq!(registry.ids(), vec!["progress-bar", "solid-color"]);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_solid_color_renders_color() {
        let component = SolidColor::default();
        let props = merge_props(&component.meta().default_props, &serde_json::json!({ "color": "#00ff00" }));
        let frame = component.render_frame(0, &props).await.unwrap();
        assert_eq!(frame.get_pixel(5, 5), &Rgba([0, 255, 0, 255]));
    }

    #[tokio::test]
    async fn test_progress_bar_fills_over_time() {
        let component = ProgressBar::default();
        let props = component.meta().default_props;
        let y = component.meta().height - 1;

        let start = component.render_frame(0, &props).await.unwrap();
        assert_eq!(start.get_pixel(0, y)[3], 0);

        let middle = component.render_frame(150, &props).await.unwrap();
        assert_eq!(middle.get_pixel(10, y), &Rgba([255, 59, 48, 255]));
        assert_eq!(middle.get_pixel(1270, y)[3], 0);

        let end = component.render_frame(10_000, &props).await.unwrap();
        assert_eq!(end.get_pixel(1279, y), &Rgba([255, 59, 48, 255]));
    }

    #[tokio::test]
    async fn test_missing_color_is_render_error() {
        let component = SolidColor::default();
        let err = component
            .render_frame(0, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_element_level());
    }
}
