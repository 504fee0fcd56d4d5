//! Process-wide decoded image cache.
//!
//! Keys are source identities (see [`crate::sources::PlayableSource::cache_key`]).
//! Entries are recomputable, so concurrent writers simply overwrite each
//! other.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use image::RgbaImage;
use lru::LruCache;

/// Default number of cached images.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

static GLOBAL_CACHE: OnceLock<Arc<ImageCache>> = OnceLock::new();

/// LRU cache of decoded RGBA images.
#[derive(Debug)]
pub struct ImageCache {
    entries: Mutex<LruCache<String, Arc<RgbaImage>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

impl ImageCache {
    /// Cache holding at most `capacity` images (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The shared process-wide cache, created on first use.
    pub fn global() -> Arc<ImageCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(ImageCache::new(DEFAULT_CACHE_CAPACITY)))
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<RgbaImage>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch an image, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<Arc<RgbaImage>> {
        let found = self.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace an image.
    pub fn insert(&self, key: impl Into<String>, image: Arc<RgbaImage>) {
        let key = key.into();
        if let Some((evicted, _)) = self.lock().push(key.clone(), image) {
            if evicted != key {
                tracing::trace!(evicted = %evicted, "Image cache eviction");
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}
