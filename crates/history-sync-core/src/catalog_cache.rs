use chrono::{DateTime, Utc};
use history_sync_sources::{CatalogRequest, LookupShape};
use serde_json::Value;
use std::collections::HashMap;

/// Key within one lookup map: (lookup key, language)
type CacheKey = (String, Option<String>);

/// Outcome of one catalog lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CachedLookup {
    Found(Value),
    /// The catalog answered that no such entry exists
    NotFound,
    /// The call failed; treated as missing for the rest of the run and
    /// never persisted
    Failed,
}

impl CachedLookup {
    pub fn value(&self) -> Option<&Value> {
        match self {
            CachedLookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub lookup: CachedLookup,
    pub stored_at: DateTime<Utc>,
}

/// One persisted-form entry, see `CatalogCacheStorage`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub shape: LookupShape,
    pub key: String,
    pub language: Option<String>,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Memo of catalog responses, one map per lookup shape.
///
/// A given (shape, key, language) is fetched at most once while the cache
/// lives; callers check [`CatalogCache::get`] before calling the catalog.
#[derive(Debug, Default)]
pub struct CatalogCache {
    by_id: HashMap<CacheKey, CacheEntry>,
    by_external_id: HashMap<CacheKey, CacheEntry>,
    by_search: HashMap<CacheKey, CacheEntry>,
    hits: usize,
    misses: usize,
    dirty: bool,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(request: &CatalogRequest) -> CacheKey {
        (request.cache_key(), request.language().map(str::to_string))
    }

    fn map(&self, shape: LookupShape) -> &HashMap<CacheKey, CacheEntry> {
        match shape {
            LookupShape::ById => &self.by_id,
            LookupShape::ByExternalId => &self.by_external_id,
            LookupShape::BySearch => &self.by_search,
        }
    }

    fn map_mut(&mut self, shape: LookupShape) -> &mut HashMap<CacheKey, CacheEntry> {
        match shape {
            LookupShape::ById => &mut self.by_id,
            LookupShape::ByExternalId => &mut self.by_external_id,
            LookupShape::BySearch => &mut self.by_search,
        }
    }

    /// Cached outcome for `request`, counting a hit or a miss
    pub fn get(&mut self, request: &CatalogRequest) -> Option<CachedLookup> {
        let found = self
            .map(request.shape())
            .get(&Self::key(request))
            .map(|entry| entry.lookup.clone());
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn contains(&self, request: &CatalogRequest) -> bool {
        self.map(request.shape()).contains_key(&Self::key(request))
    }

    pub fn insert(&mut self, request: &CatalogRequest, lookup: CachedLookup) {
        let key = Self::key(request);
        self.map_mut(request.shape()).insert(
            key,
            CacheEntry {
                lookup,
                stored_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Restore an entry read from disk, keeping its original timestamp
    pub fn restore(&mut self, record: CacheRecord) {
        self.map_mut(record.shape)
            .insert((record.key, record.language), record.entry);
    }

    /// Entries worth persisting: failures are left out
    pub fn records(&self) -> Vec<CacheRecord> {
        let shapes = [LookupShape::ById, LookupShape::ByExternalId, LookupShape::BySearch];
        let mut records = Vec::new();
        for shape in shapes {
            for ((key, language), entry) in self.map(shape) {
                if entry.lookup == CachedLookup::Failed {
                    continue;
                }
                records.push(CacheRecord {
                    shape,
                    key: key.clone(),
                    language: language.clone(),
                    entry: entry.clone(),
                });
            }
        }
        records
    }

    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_external_id.len() + self.by_search.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.len(),
        }
    }

    /// Whether anything was inserted since load
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
