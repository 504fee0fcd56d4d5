//! On-disk timeline document: `{ "tracks": [...], "settings": {...} }`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::settings::ExportSettings;
use crate::timeline::{Timeline, TimelineError};

/// A timeline together with the export settings it was saved with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    #[serde(flatten)]
    pub timeline: Timeline,

    #[serde(default)]
    pub settings: ExportSettings,
}

impl TimelineDocument {
    pub fn new(timeline: Timeline, settings: ExportSettings) -> Self {
        Self { timeline, settings }
    }

    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TimelineError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let document = Self::from_json(&json).map_err(|e| TimelineError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            path = %path.display(),
            tracks = document.timeline.tracks.len(),
            elements = document.timeline.element_count(),
            "Timeline document loaded"
        );
        Ok(document)
    }

    /// Write the document as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TimelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TimelineError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = self.to_json().map_err(|e| TimelineError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| TimelineError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::settings::ExportFormat;
    use crate::track::TrackKind;

    #[test]
    fn test_document_wire_shape() {
        let json = r#"{
            "tracks": [
                {
                    "id": "t1",
                    "name": "Main Track",
                    "type": "media",
                    "isMain": true,
                    "elements": [
                        { "id": "e1", "type": "media", "mediaId": "m1",
                          "startTime": 0, "duration": 5, "trimStart": 0, "trimEnd": 1 }
                    ]
                }
            ]
        }"#;
        let doc = TimelineDocument::from_json(json).unwrap();
        assert_eq!(doc.timeline.tracks.len(), 1);
        assert!(doc.timeline.tracks[0].is_main);
        assert_eq!(doc.timeline.total_duration(), 4.0);
        assert_eq!(doc.settings, ExportSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("qcut_doc_{}", crate::element::new_id()));
        let path = dir.join("timeline.json");

        let mut timeline = Timeline::with_main_track();
        let main = timeline.tracks[0].id.clone();
        timeline
            .add_element(&main, Element::media("m1", 1.0, 3.0).with_id("clip"))
            .unwrap();
        let stickers = timeline.add_track(TrackKind::Sticker, "Stickers");
        timeline
            .add_element(&stickers, Element::sticker("s1", 0.0, 2.0, 3))
            .unwrap();

        let settings = ExportSettings::new(1280, 720, 24).with_format(ExportFormat::Webm);
        let doc = TimelineDocument::new(timeline, settings);
        doc.save(&path).unwrap();

        let loaded = TimelineDocument::load(&path).unwrap();
        assert_eq!(loaded, doc);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_reports_path() {
        let path = std::env::temp_dir().join("qcut_doc_missing/timeline.json");
        match TimelineDocument::load(&path) {
            Err(TimelineError::IoError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected IoError, got {other:?}"),
        }
    }
}
