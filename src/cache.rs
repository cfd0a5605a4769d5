//! Cache of aggregate statistics per feature type
//!
//! Entries are keyed by `(type, "stats", kind)` and carry the content hash
//! of the provider configuration they were computed with. A lookup with a
//! different hash is a miss, so a changed configuration never serves stale
//! extents. Dataset change notifications drop the entries of a type with
//! [`StatsCache::invalidate`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

const STATS: &str = "stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsKind {
    Count,
    Spatial,
    Temporal,
}

impl StatsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsKind::Count => "count",
            StatsKind::Spatial => "spatial",
            StatsKind::Temporal => "temporal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsCacheKey {
    pub type_name: String,
    pub category: &'static str,
    pub kind: StatsKind,
}

impl StatsCacheKey {
    pub fn new(type_name: &str, kind: StatsKind) -> Self {
        StatsCacheKey {
            type_name: type_name.to_string(),
            category: STATS,
            kind,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    content_hash: String,
    value: JsonValue,
}

#[derive(Debug, Default)]
pub struct StatsCache {
    entries: Mutex<HashMap<StatsCacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        type_name: &str,
        kind: StatsKind,
        content_hash: &str,
    ) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let cached = entries
            .get(&StatsCacheKey::new(type_name, kind))
            .filter(|entry| entry.content_hash == content_hash)
            .and_then(|entry| serde_json::from_value(entry.value.clone()).ok());

        match cached {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        cached
    }

    pub fn put<T: Serialize>(&self, type_name: &str, kind: StatsKind, content_hash: &str, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            StatsCacheKey::new(type_name, kind),
            CacheEntry {
                content_hash: content_hash.to_string(),
                value,
            },
        );
    }

    /// Drop all entries of a feature type
    pub fn invalidate(&self, type_name: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|key, _| key.type_name != type_name);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)`
    pub fn metrics(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
