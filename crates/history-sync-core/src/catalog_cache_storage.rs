use anyhow::Result;
use bincode::{deserialize, serialize};
use chrono::{Duration, TimeZone, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use history_sync_sources::LookupShape;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use crate::catalog_cache::{CacheEntry, CacheRecord, CachedLookup, CatalogCache};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    shape: u8,
    key: String,
    language: Option<String>,
    /// JSON text; `None` marks a not-found answer
    body: Option<String>,
    stored_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCache {
    version: u32,
    entries: Vec<StoredEntry>,
}

fn shape_tag(shape: LookupShape) -> u8 {
    match shape {
        LookupShape::ById => 0,
        LookupShape::ByExternalId => 1,
        LookupShape::BySearch => 2,
    }
}

fn shape_from_tag(tag: u8) -> Option<LookupShape> {
    match tag {
        0 => Some(LookupShape::ById),
        1 => Some(LookupShape::ByExternalId),
        2 => Some(LookupShape::BySearch),
        _ => None,
    }
}

/// Gzip-compressed bincode snapshot of the catalog cache
///
/// Loading never fails on bad content: an incompatible file is backed up
/// and an empty cache is returned.
pub struct CatalogCacheStorage {
    cache_path: PathBuf,
    ttl: Duration,
}

impl CatalogCacheStorage {
    pub fn new(cache_path: PathBuf, ttl_days: u32) -> Self {
        Self {
            cache_path,
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Load unexpired entries
    pub fn load(&self) -> Result<CatalogCache> {
        if !self.cache_path.exists() {
            debug!("Catalog cache file does not exist, starting empty");
            return Ok(CatalogCache::new());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.cache_path)?;

        let stored = match Self::decode(&data) {
            Ok(stored) if stored.version == FORMAT_VERSION => stored,
            Ok(stored) => {
                self.backup_incompatible(&format!("version {}", stored.version));
                return Ok(CatalogCache::new());
            }
            Err(e) => {
                self.backup_incompatible(&e.to_string());
                return Ok(CatalogCache::new());
            }
        };

        let cutoff = Utc::now() - self.ttl;
        let mut cache = CatalogCache::new();
        let mut expired = 0;
        for entry in stored.entries {
            let stored_at = match Utc.timestamp_opt(entry.stored_at, 0).single() {
                Some(ts) if ts >= cutoff => ts,
                _ => {
                    expired += 1;
                    continue;
                }
            };
            let shape = match shape_from_tag(entry.shape) {
                Some(shape) => shape,
                None => continue,
            };
            let lookup = match entry.body {
                Some(body) => match serde_json::from_str(&body) {
                    Ok(value) => CachedLookup::Found(value),
                    Err(_) => continue,
                },
                None => CachedLookup::NotFound,
            };
            cache.restore(CacheRecord {
                shape,
                key: entry.key,
                language: entry.language,
                entry: CacheEntry { lookup, stored_at },
            });
        }

        info!(
            "Loaded catalog cache: {} entries ({} expired) in {:?}",
            cache.len(),
            expired,
            start.elapsed()
        );
        Ok(cache)
    }

    /// Save all persistable entries (atomic temp file + rename)
    pub fn save(&self, cache: &CatalogCache) -> Result<()> {
        let start = std::time::Instant::now();
        let mut entries = Vec::new();
        for record in cache.records() {
            let body = match &record.entry.lookup {
                CachedLookup::Found(value) => Some(serde_json::to_string(value)?),
                CachedLookup::NotFound => None,
                CachedLookup::Failed => continue,
            };
            entries.push(StoredEntry {
                shape: shape_tag(record.shape),
                key: record.key,
                language: record.language,
                body,
                stored_at: record.entry.stored_at.timestamp(),
            });
        }
        let count = entries.len();

        let serialized = serialize(&StoredCache {
            version: FORMAT_VERSION,
            entries,
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.cache_path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.cache_path)?;

        info!("Saved catalog cache: {} entries in {:?}", count, start.elapsed());
        Ok(())
    }

    /// Remove the snapshot; returns whether a file existed
    pub fn clear(&self) -> Result<bool> {
        if self.cache_path.exists() {
            std::fs::remove_file(&self.cache_path)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn size(&self) -> Result<u64> {
        if self.cache_path.exists() {
            Ok(std::fs::metadata(&self.cache_path)?.len())
        } else {
            Ok(0)
        }
    }

    fn decode(data: &[u8]) -> Result<StoredCache> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(deserialize(&decompressed)?)
    }

    fn backup_incompatible(&self, reason: &str) {
        let backup_path = self.cache_path.with_extension("bin.bak");
        match std::fs::copy(&self.cache_path, &backup_path) {
            Ok(_) => info!(
                "Catalog cache incompatible ({}). Backed up to {:?}, starting empty.",
                reason, backup_path
            ),
            Err(e) => warn!("Failed to back up incompatible catalog cache: {}. Starting empty.", e),
        }
    }
}
