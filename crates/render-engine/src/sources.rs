//! Collaborator contracts for media and overlay resources, plus source
//! selection.
//!
//! The engine never decodes media itself: a [`MediaProvider`] turns a
//! playable source and a source time into an RGBA frame, and an
//! [`OverlayLookup`] resolves sticker images.

use std::path::PathBuf;

use image::RgbaImage;
use qcut_common::error::QcutResult;

/// Where the bytes of a media item live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A file on local disk.
    Local(PathBuf),
    /// An `http(s)` URL.
    Remote(String),
}

/// Metadata about a media library item.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub id: String,
    /// Source duration in seconds (0 for stills).
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub sources: Vec<MediaSource>,
}

/// The source chosen for decoding a media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableSource {
    pub media_id: String,
    pub source: MediaSource,
}

impl PlayableSource {
    /// Identity used for image cache keys.
    pub fn cache_key(&self) -> String {
        match &self.source {
            MediaSource::Local(path) => format!("file:{}", path.display()),
            MediaSource::Remote(url) => format!("url:{url}"),
        }
    }
}

/// Resolves media ids and decodes frames.
#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    /// Look up a media item. `None` when the id is unknown.
    async fn media(&self, media_id: &str) -> Option<MediaInfo>;

    /// Decode the frame shown at `source_time` seconds into the source.
    async fn load_frame(&self, source: &PlayableSource, source_time: f64) -> QcutResult<RgbaImage>;
}

/// Resolves sticker images by media item id.
#[async_trait::async_trait]
pub trait OverlayLookup: Send + Sync {
    /// `Ok(None)` when the item no longer exists.
    async fn load_overlay(&self, media_item_id: &str) -> QcutResult<Option<RgbaImage>>;
}

/// Provider that knows no media. Used when a pipeline is built without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

#[async_trait::async_trait]
impl MediaProvider for NoMedia {
    async fn media(&self, _media_id: &str) -> Option<MediaInfo> {
        None
    }

    async fn load_frame(&self, source: &PlayableSource, _source_time: f64) -> QcutResult<RgbaImage> {
        Err(qcut_common::error::QcutError::resource_unavailable(format!(
            "no media provider for {}",
            source.media_id
        )))
    }
}

#[async_trait::async_trait]
impl OverlayLookup for NoMedia {
    async fn load_overlay(&self, _media_item_id: &str) -> QcutResult<Option<RgbaImage>> {
        Ok(None)
    }
}

/// Pick the source to decode: any local file first, then the first remote
/// URL whose origin is allow-listed. `None` means "no playable source".
pub fn select_playable_source(info: &MediaInfo, allow_list: &[String]) -> Option<PlayableSource> {
    let local = info
        .sources
        .iter()
        .find(|s| matches!(s, MediaSource::Local(_)));

    let chosen = local.or_else(|| {
        info.sources.iter().find(|s| match s {
            MediaSource::Remote(url) => {
                let allowed = is_origin_allowed(url, allow_list);
                if !allowed {
                    tracing::debug!(media = %info.id, url = %url, "Remote origin not allow-listed");
                }
                allowed
            }
            MediaSource::Local(_) => false,
        })
    })?;

    Some(PlayableSource {
        media_id: info.id.clone(),
        source: chosen.clone(),
    })
}

/// Normalized `scheme://host[:port]` of a URL. Default ports are dropped;
/// scheme and host are lower-cased.
pub fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.trim().split_once("://")?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let scheme = scheme.to_ascii_lowercase();

    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    if host_port.is_empty() {
        return None;
    }

    // Bracketed IPv6 literals keep their colons.
    let (host, port) = if let Some(end) = host_port.find(']') {
        let (host, tail) = host_port.split_at(end + 1);
        (host, tail.strip_prefix(':'))
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };
    if host.is_empty() {
        return None;
    }
    let host = host.to_ascii_lowercase();

    let port = match port {
        Some("") | None => None,
        Some(p) => {
            let number: u16 = p.parse().ok()?;
            let default = matches!((scheme.as_str(), number), ("http", 80) | ("https", 443));
            (!default).then_some(number)
        }
    };

    Some(match port {
        Some(p) => format!("{scheme}://{host}:{p}"),
        None => format!("{scheme}://{host}"),
    })
}

/// Whether `url`'s origin matches an allow-list entry.
pub fn is_origin_allowed(url: &str, allow_list: &[String]) -> bool {
    let Some(origin) = origin_of(url) else {
        return false;
    };
    allow_list
        .iter()
        .filter_map(|entry| origin_of(entry))
        .any(|allowed| allowed == origin)
}
