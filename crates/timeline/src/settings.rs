//! Global export settings carried alongside a timeline.

use serde::{Deserialize, Serialize};

/// Output dimensions, rate and container for an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Output resolution in pixels.
    pub width: u32,
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    #[serde(default)]
    pub format: ExportFormat,

    #[serde(default)]
    pub quality: ExportQuality,
}

/// Output container/codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    #[serde(rename = "mp4-h265")]
    Mp4H265,
    Webm,
    Gif,
}

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            format: ExportFormat::default(),
            quality: ExportQuality::default(),
        }
    }
}

impl ExportSettings {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: ExportQuality) -> Self {
        self.quality = quality;
        self
    }
}

impl ExportFormat {
    /// File extension for the container.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 | ExportFormat::Mp4H265 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 => "mp4-h264",
            ExportFormat::Mp4H265 => "mp4-h265",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp4-h264" | "mp4" | "h264" => Ok(ExportFormat::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(ExportFormat::Mp4H265),
            "webm" => Ok(ExportFormat::Webm),
            "gif" => Ok(ExportFormat::Gif),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

impl std::str::FromStr for ExportQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ExportQuality::Low),
            "medium" => Ok(ExportQuality::Medium),
            "high" => Ok(ExportQuality::High),
            other => Err(format!("unknown export quality: {other}")),
        }
    }
}
