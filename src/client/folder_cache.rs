//! Bounded cache of recently visited folders.
//!
//! Recency is by write only: looking an entry up never protects it from
//! eviction. Entries hold resolved image URLs so they can be rendered
//! without touching the credential store again.

use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use tracing::debug;

use crate::models::Pagination;

/// Number of folders kept in memory.
pub const FOLDER_CACHE_CAPACITY: usize = 3;

/// Landing page of one folder.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub folder_name: String,
    /// Self-authenticating image URLs in gallery order.
    pub images: Vec<String>,
    pub pagination: Pagination,
    pub last_accessed: Instant,
}

pub struct FolderCache {
    entries: LruCache<String, CacheEntry>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::with_capacity(FOLDER_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Returns the entry for `folder` without touching its recency.
    pub fn get(&self, folder: &str) -> Option<&CacheEntry> {
        self.entries.peek(folder)
    }

    /// Stores `images` for `folder`, evicting the oldest other folder when full.
    pub fn put(&mut self, folder: &str, images: Vec<String>, pagination: Pagination) {
        let entry = CacheEntry {
            folder_name: folder.to_string(),
            images,
            pagination,
            last_accessed: Instant::now(),
        };
        if let Some((evicted, _)) = self.entries.push(folder.to_string(), entry) {
            if evicted != folder {
                debug!(folder = %evicted, "Evicted folder from cache");
            }
        }
    }

    pub fn contains(&self, folder: &str) -> bool {
        self.entries.contains(folder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for FolderCache {
    fn default() -> Self {
        Self::new()
    }
}
