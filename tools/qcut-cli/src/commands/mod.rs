pub mod check;
pub mod export;
pub mod info;
pub mod library;
pub mod plan;
pub mod validate;

use std::path::Path;

use qcut_timeline::{ExportSettings, TimelineDocument};

use crate::SettingsArgs;

pub fn load_document(path: &Path) -> anyhow::Result<TimelineDocument> {
    TimelineDocument::load(path).map_err(|e| anyhow::anyhow!("Failed to load timeline: {e}"))
}

/// Document settings with command-line overrides applied.
pub fn resolve_settings(
    document: &TimelineDocument,
    args: &SettingsArgs,
) -> anyhow::Result<ExportSettings> {
    let mut settings = document.settings.clone();
    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some(format) = &args.format {
        settings.format = format.parse().map_err(|e: String| {
            anyhow::anyhow!("{e}. Use: mp4-h264, mp4-h265, webm, gif")
        })?;
    }
    if let Some(quality) = &args.quality {
        settings.quality = quality
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{e}. Use: low, medium, high"))?;
    }
    Ok(settings)
}
