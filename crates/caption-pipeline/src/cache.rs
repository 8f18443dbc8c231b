use crate::{Caption, ImageRef};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Bumped on every [`CaptionCache::clear`]. Writers tag their puts with the generation
/// they started in, so a run left over from an older selection cannot repopulate the cache.
pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub image: ImageRef,
    pub caption: Caption,
    /// Write order within the current generation, starting at 0.
    pub sequence: u64,
}

#[derive(Default)]
struct CacheInner {
    generation: Generation,
    next_sequence: u64,
    entries: HashMap<ImageRef, CacheEntry>,
}

impl CacheInner {
    fn insert(&mut self, image: ImageRef, caption: Caption) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            image.clone(),
            CacheEntry {
                image,
                caption,
                sequence,
            },
        );
    }
}

/// Image → caption map shared by the worker (single writer) and the display side.
/// A key is present only once its captioning attempt has finished.
#[derive(Clone, Default)]
pub struct CaptionCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl CaptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> Generation {
        self.read().generation
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&self) -> Generation {
        let mut inner = self.write();
        inner.generation += 1;
        inner.next_sequence = 0;
        inner.entries.clear();
        inner.generation
    }

    pub fn put(&self, image: ImageRef, caption: Caption) {
        self.write().insert(image, caption);
    }

    /// Like [`CaptionCache::put`], but only if `generation` is still current.
    pub fn put_for(&self, generation: Generation, image: ImageRef, caption: Caption) -> bool {
        let mut inner = self.write();
        if inner.generation != generation {
            return false;
        }
        inner.insert(image, caption);
        true
    }

    pub fn get(&self, image: &ImageRef) -> Option<Caption> {
        self.read().entries.get(image).map(|v| v.caption.clone())
    }

    pub fn contains(&self, image: &ImageRef) -> bool {
        self.read().entries.contains_key(image)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// All entries in write order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.read().entries.values().cloned().collect();
        entries.sort_by_key(|v| v.sequence);
        entries
    }
}
