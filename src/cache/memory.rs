//! In-memory image cache with LRU eviction using moka.
//!
//! Sits in front of archive reads. Bounded by entry count and by idle time
//! (reading an entry refreshes its age). Keys are prefixed with the mod
//! name so two mods shipping the same path never share an entry.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A cached lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedImage {
    /// Data URL of the image
    Valid(Arc<str>),
    /// The image is known to be missing or unreadable
    Invalid,
}

pub struct ImageMemoryCache {
    cache: Cache<String, CachedImage>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageMemoryCache {
    pub fn new(capacity: u64, time_to_idle: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(time_to_idle)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key: Arc<String>, _value, cause| {
                debug!("Image cache dispose {} ({:?})", key, cause);
            })
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key of an image inside a mod
    pub fn key(mod_name: &str, image_path: &str) -> String {
        format!("[{}]_{}", mod_name, image_path)
    }

    pub fn get(&self, key: &str) -> Option<CachedImage> {
        let found = self.cache.get(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: String, value: CachedImage) {
        self.cache.insert(key, value);
    }

    /// Run pending eviction work so counts are exact
    pub fn sync(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
