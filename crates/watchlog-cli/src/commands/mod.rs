pub mod clear;
pub mod config;
pub mod status;
pub mod sync;

use color_eyre::Result;
use history_sync_config::{Config, PathManager};

/// Config file (or defaults) with environment overrides, plus the paths it
/// resolves to
pub(crate) fn load_config() -> Result<(Config, PathManager)> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    let paths = path_manager.with_overrides(config.paths.clone());
    Ok((config, paths))
}

pub(crate) fn mask_string(s: &str) -> String {
    if s.is_empty() {
        return "<not set>".to_string();
    }
    if s.len() <= 4 {
        return "*".repeat(s.len());
    }
    match (s.get(..2), s.get(s.len() - 2..)) {
        (Some(head), Some(tail)) => format!("{}***{}", head, tail),
        _ => "***".to_string(),
    }
}
