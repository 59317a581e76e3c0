use anyhow::{Context, Result};
use chrono::Utc;
use history_sync_models::{sort_newest_first, WatchEvent};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Append-only JSON Lines log of watch events.
///
/// The file is in append order, not sorted by `watched_at`: a backfill or
/// a late-arriving older watch lands after newer lines. Use
/// [`load_newest_first`](EventLog::load_newest_first) for a newest-first view.
/// Prior lines are never rewritten; the first mutation of a log instance
/// copies the existing file to a timestamped backup first.
pub struct EventLog {
    path: PathBuf,
    backup_dir: PathBuf,
    backed_up: bool,
}

impl EventLog {
    pub fn new(path: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            path,
            backup_dir,
            backed_up: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Every readable record, in file order.
    ///
    /// An unreadable file counts as empty and malformed lines are skipped;
    /// both are reported as warnings.
    pub fn load(&self) -> Vec<WatchEvent> {
        if !self.path.exists() {
            debug!(path = ?self.path, "Event log does not exist yet");
            return Vec::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = ?self.path, "Event log unreadable, treating as empty: {}", e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let mut malformed = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WatchEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    malformed += 1;
                    warn!(path = ?self.path, line = line_no + 1, "Skipping malformed event log line: {}", e);
                }
            }
        }

        debug!(records = events.len(), malformed, "Loaded event log");
        events
    }

    /// Read view for page rendering
    pub fn load_newest_first(&self) -> Vec<WatchEvent> {
        let mut events = self.load();
        sort_newest_first(&mut events);
        events
    }

    /// Append `records` in the given order and return how many were written
    pub fn append(&mut self, records: &[WatchEvent]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        if self.path.exists() {
            self.backup()?;
            self.append_lines(&buffer)?;
        } else {
            self.write_new(&buffer)?;
        }

        info!(path = ?self.path, appended = records.len(), "Appended events to log");
        Ok(records.len())
    }

    fn append_lines(&self, buffer: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening event log {:?} for append", self.path))?;

        // A torn last line must not swallow the first appended record
        let len = file.metadata()?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        file.write_all(buffer.as_bytes())
            .and_then(|_| file.sync_data())
            .with_context(|| format!("failed writing event log {:?}", self.path))?;
        Ok(())
    }

    fn write_new(&self, buffer: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("jsonl.tmp");
        std::fs::write(&temp_path, buffer)
            .with_context(|| format!("failed writing {:?}", temp_path))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed moving {:?} into place", temp_path))?;
        Ok(())
    }

    /// Copy the current log aside, once per instance
    fn backup(&mut self) -> Result<Option<PathBuf>> {
        if self.backed_up || !self.path.exists() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.backup_dir)?;
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("events");
        let backup_path = self
            .backup_dir
            .join(format!("{}.{}.jsonl", stem, Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        std::fs::copy(&self.path, &backup_path)
            .with_context(|| format!("failed backing up event log to {:?}", backup_path))?;
        self.backed_up = true;
        debug!(backup = ?backup_path, "Backed up event log");
        Ok(Some(backup_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use history_sync_models::{MovieEnrichment, MovieWatch, PrimaryIds};
    use tempfile::tempdir;

    fn movie(title: &str, hour: u32) -> WatchEvent {
        WatchEvent::Movie(MovieWatch {
            remote_event_id: None,
            watched_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            action: None,
            title: title.to_string(),
            year: None,
            ids: PrimaryIds::default(),
            enrichment: MovieEnrichment::default(),
        })
    }

    fn log_in(dir: &Path) -> EventLog {
        EventLog::new(dir.join("data").join("history.jsonl"), dir.join("backups"))
    }

    fn backups(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("backups")).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        assert!(log_in(dir.path()).load().is_empty());
    }

    #[test]
    fn test_first_write_creates_file_without_backup() {
        let dir = tempdir().unwrap();
        let mut log = log_in(dir.path());
        assert_eq!(log.append(&[movie("A", 1), movie("B", 2)]).unwrap(), 2);

        assert_eq!(log.load(), vec![movie("A", 1), movie("B", 2)]);
        assert_eq!(backups(dir.path()), 0);
        assert!(!log.path().with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_append_keeps_prior_lines_and_backs_up_once() {
        let dir = tempdir().unwrap();
        log_in(dir.path()).append(&[movie("A", 1)]).unwrap();
        let before = std::fs::read_to_string(log_in(dir.path()).path()).unwrap();

        let mut log = log_in(dir.path());
        log.append(&[movie("B", 2)]).unwrap();
        log.append(&[movie("C", 3)]).unwrap();

        let after = std::fs::read_to_string(log.path()).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(log.load().len(), 3);
        assert_eq!(backups(dir.path()), 1);
    }

    #[test]
    fn test_empty_append_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut log = log_in(dir.path());
        assert_eq!(log.append(&[]).unwrap(), 0);
        assert!(!log.exists());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let mut log = log_in(dir.path());
        log.append(&[movie("A", 1)]).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{not json}\n\n{\"type\":\"movie\",\"title\":\"torn").unwrap();
        drop(file);

        log.append(&[movie("B", 2)]).unwrap();
        let events = log.load();
        assert_eq!(events, vec![movie("A", 1), movie("B", 2)]);
    }

    #[test]
    fn test_unreadable_log_is_empty() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        std::fs::create_dir_all(log.path().parent().unwrap()).unwrap();
        std::fs::write(log.path(), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_file_keeps_append_order_newest_first_is_a_view() {
        let dir = tempdir().unwrap();
        let mut log = log_in(dir.path());
        log.append(&[movie("B", 2), movie("A", 1)]).unwrap();
        // file order is not watched_at order
        log.append(&[movie("C", 3)]).unwrap();

        let in_file: Vec<String> = log.load().iter().map(|e| e.label()).collect();
        assert_eq!(in_file, vec!["B", "A", "C"]);
        let titles: Vec<String> = log.load_newest_first().iter().map(|e| e.label()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
    }
}
