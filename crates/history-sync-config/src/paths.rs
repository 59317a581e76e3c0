use anyhow::Result;
use std::path::{Path, PathBuf};
use crate::config::PathOverrides;

/// Base path from the environment, used for containers and CI checkouts
pub fn env_base_path() -> Option<PathBuf> {
    std::env::var("WATCHLOG_BASE_PATH").ok().map(PathBuf::from)
}

/// Locations of every file the engine reads or writes
pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
    overrides: PathOverrides,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("watchlog");
        Ok(Self::from_base(base_dir))
    }

    /// Config at the base, data and logs in subdirectories
    pub fn from_base(base: PathBuf) -> Self {
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
            overrides: PathOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: PathOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }

    pub fn history_file(&self) -> PathBuf {
        self.overrides
            .history_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("watch_history.jsonl"))
    }

    pub fn cursor_file(&self) -> PathBuf {
        self.overrides
            .cursor_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("history.cursor"))
    }

    /// Tokens written after a refresh, for an external rotation job
    pub fn rotated_tokens_file(&self) -> PathBuf {
        self.overrides
            .rotated_tokens_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("rotated_tokens.json"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.overrides
            .backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    pub fn catalog_cache_file(&self) -> PathBuf {
        self.cache_dir().join("catalog_cache.bin")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("watchlog.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.cache_dir())?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        if let Some(base) = env_base_path() {
            return Self::from_base(base);
        }
        // Platform-specific paths, e.g. ~/.config/watchlog on Linux
        Self::new().unwrap_or_else(|_| Self::from_base(PathBuf::from(".watchlog")))
    }
}
