//! Font lookup for text and caption layers.
//!
//! A bundled DejaVu Sans face is always available as the fallback, so text
//! renders on hosts without system fonts. Extra faces are registered from
//! font directories and looked up by family name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ab_glyph::FontArc;
use qcut_common::error::{QcutError, QcutResult};

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const BUNDLED_FAMILY: &str = "DejaVu Sans";

static GLOBAL_FONTS: OnceLock<Arc<FontBook>> = OnceLock::new();

/// Font faces by normalized family name, plus a fallback face.
#[derive(Clone)]
pub struct FontBook {
    families: HashMap<String, FontArc>,
    fallback: Option<FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<&String> = self.families.keys().collect();
        families.sort();
        f.debug_struct("FontBook")
            .field("families", &families)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    /// Book holding only the bundled face.
    pub fn new() -> Self {
        let mut book = Self {
            families: HashMap::new(),
            fallback: None,
        };
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => {
                book.families
                    .insert(normalize_family(BUNDLED_FAMILY), font.clone());
                book.fallback = Some(font);
            }
            Err(e) => tracing::error!(error = %e, "Bundled font failed to parse"),
        }
        book
    }

    /// Bundled face plus every font found in `dirs`. Unreadable
    /// directories are logged and skipped.
    pub fn with_dirs(dirs: &[PathBuf]) -> Self {
        let mut book = Self::new();
        for dir in dirs {
            match book.load_dir(dir) {
                Ok(count) => tracing::debug!(dir = %dir.display(), count, "Fonts loaded"),
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Font directory skipped"),
            }
        }
        book
    }

    /// The shared book with the bundled face, created on first use.
    pub fn global() -> Arc<FontBook> {
        GLOBAL_FONTS
            .get_or_init(|| Arc::new(FontBook::new()))
            .clone()
    }

    /// Register `.ttf`/`.otf` files in `dir` under their file stem.
    /// Returns how many faces were added.
    pub fn load_dir(&mut self, dir: &Path) -> QcutResult<usize> {
        let mut added = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_font = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"));
            let Some(family) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            if !is_font {
                continue;
            }
            match std::fs::read(&path)
                .map_err(QcutError::from)
                .and_then(|bytes| self.register(&family, bytes))
            {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Font skipped"),
            }
        }
        Ok(added)
    }

    /// Register a face from raw font bytes.
    pub fn register(&mut self, family: &str, bytes: Vec<u8>) -> QcutResult<()> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| QcutError::render(format!("invalid font '{family}': {e}")))?;
        self.families.insert(normalize_family(family), font);
        Ok(())
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families.contains_key(&normalize_family(family))
    }

    /// Face for a CSS-style family list such as `"Inter, Arial, sans-serif"`.
    /// The first registered name wins; otherwise the fallback face.
    pub fn resolve(&self, family: &str) -> Option<&FontArc> {
        family
            .split(',')
            .map(normalize_family)
            .find_map(|name| self.families.get(&name))
            .or(self.fallback.as_ref())
    }
}

/// Lowercase with quotes, spaces, dashes and underscores removed.
fn normalize_family(family: &str) -> String {
    family
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '"' | '\''))
        .flat_map(char::to_lowercase)
        .collect()
}
