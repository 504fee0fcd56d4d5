//! Media and sticker lookup backed by a directory of still images.
//!
//! An id `clip1` resolves to the first of `clip1.png`, `clip1.jpg` or
//! `clip1.jpeg` under the root. Every frame of a media item is the same
//! still.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use qcut_common::error::{QcutError, QcutResult};
use qcut_render_engine::{MediaInfo, MediaProvider, MediaSource, OverlayLookup, PlayableSource};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone)]
pub struct ImageDirectory {
    root: PathBuf,
}

impl ImageDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, id: &str) -> Option<PathBuf> {
        // Ids are file stems; reject anything that could leave the root.
        if id.is_empty() || id.contains(['/', '\\']) || id == ".." {
            return None;
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }
}

async fn decode(path: PathBuf) -> QcutResult<RgbaImage> {
    tokio::task::spawn_blocking(move || {
        image::open(&path)
            .map(|img| img.into_rgba8())
            .map_err(|e| QcutError::render(format!("failed to decode {}: {e}", path.display())))
    })
    .await
    .map_err(|e| QcutError::render(format!("decode task failed: {e}")))?
}

fn dimensions(path: &Path) -> (u32, u32) {
    image::image_dimensions(path).unwrap_or((0, 0))
}

#[async_trait::async_trait]
impl MediaProvider for ImageDirectory {
    async fn media(&self, media_id: &str) -> Option<MediaInfo> {
        let path = self.find(media_id)?;
        let (width, height) = dimensions(&path);
        Some(MediaInfo {
            id: media_id.to_string(),
            duration: 0.0,
            width,
            height,
            sources: vec![MediaSource::Local(path)],
        })
    }

    async fn load_frame(&self, source: &PlayableSource, _source_time: f64) -> QcutResult<RgbaImage> {
        match &source.source {
            MediaSource::Local(path) => decode(path.clone()).await,
            MediaSource::Remote(url) => Err(QcutError::unsupported(format!(
                "remote media is not fetched by the CLI: {url}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl OverlayLookup for ImageDirectory {
    async fn load_overlay(&self, media_item_id: &str) -> QcutResult<Option<RgbaImage>> {
        match self.find(media_item_id) {
            Some(path) => decode(path).await.map(Some),
            None => Ok(None),
        }
    }
}
