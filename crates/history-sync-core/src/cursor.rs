use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use history_sync_models::Watermark;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Older history a page-limited run could not reach.
///
/// Events in `[cursor, end_at]` are still to be fetched; everything newer
/// up to `high_water` is already in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backfill {
    /// Oldest `watched_at` fetched so far
    pub end_at: Watermark,
    /// Newest `watched_at` fetched since the backfill started
    pub high_water: DateTime<Utc>,
}

/// Single-timestamp text file holding the sync watermark, plus a sibling
/// `.backfill` JSON file while older history is still pending
pub struct CursorStore {
    path: PathBuf,
    backfill_path: PathBuf,
}

impl CursorStore {
    pub fn new(path: PathBuf) -> Self {
        let mut name = path.file_name().map(OsString::from).unwrap_or_else(|| OsString::from("history.cursor"));
        name.push(".backfill");
        let backfill_path = path.with_file_name(name);
        Self { path, backfill_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backfill_path(&self) -> &Path {
        &self.backfill_path
    }

    /// Stored watermark; a missing or unparseable file means "from the start"
    pub fn load(&self) -> Option<Watermark> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No cursor stored yet");
                return None;
            }
            Err(e) => {
                warn!(path = ?self.path, "Cursor unreadable, starting without one: {}", e);
                return None;
            }
        };
        if raw.trim().is_empty() {
            return None;
        }
        let watermark = Watermark::parse(&raw);
        if watermark.is_none() {
            warn!(path = ?self.path, value = raw.trim(), "Ignoring unparseable cursor");
        }
        watermark
    }

    /// Replace the stored watermark atomically
    pub fn save(&self, watermark: Watermark) -> Result<()> {
        write_atomic(&self.path, &watermark.to_string())
    }

    /// Pending backfill window, if a previous run stopped at the page limit
    pub fn load_backfill(&self) -> Option<Backfill> {
        let raw = std::fs::read_to_string(&self.backfill_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(backfill) => Some(backfill),
            Err(e) => {
                warn!(path = ?self.backfill_path, "Ignoring unreadable backfill state: {}", e);
                None
            }
        }
    }

    pub fn save_backfill(&self, backfill: &Backfill) -> Result<()> {
        write_atomic(&self.backfill_path, &serde_json::to_string(backfill)?)
    }

    /// Returns whether a backfill was pending
    pub fn clear_backfill(&self) -> Result<bool> {
        remove_if_exists(&self.backfill_path)
    }

    /// Remove the stored watermark and any pending backfill; returns whether
    /// anything existed
    pub fn clear(&self) -> Result<bool> {
        let cursor = remove_if_exists(&self.path)?;
        let backfill = self.clear_backfill()?;
        Ok(cursor || backfill)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed writing {:?}", temp_path))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed moving {:?} into place", path))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        std::fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state").join("history.cursor"));
        assert_eq!(store.load(), None);

        let mark = Watermark(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        store.save(mark).unwrap();
        assert_eq!(store.load(), Some(mark));
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "2024-05-01T12:00:00.000Z"
        );
    }

    #[test]
    fn test_accepts_hand_written_timestamps() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("history.cursor"));
        std::fs::write(store.path(), "2024-05-01T14:00:00+02:00\n").unwrap();
        assert_eq!(store.load(), Some(Watermark(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())));
    }

    #[test]
    fn test_garbage_is_ignored() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("history.cursor"));
        std::fs::write(store.path(), "last tuesday").unwrap();
        assert_eq!(store.load(), None);

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_backfill_round_trip_and_clear() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("history.cursor"));
        assert_eq!(store.backfill_path(), dir.path().join("history.cursor.backfill"));
        assert_eq!(store.load_backfill(), None);

        let backfill = Backfill {
            end_at: Watermark(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap()),
            high_water: Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(),
        };
        store.save_backfill(&backfill).unwrap();
        assert_eq!(store.load_backfill(), Some(backfill));
        // the cursor itself is untouched
        assert_eq!(store.load(), None);

        assert!(store.clear().unwrap());
        assert_eq!(store.load_backfill(), None);
    }
}
