use super::load_config;
use crate::output::Output;
use color_eyre::Result;
use history_sync_config::{CredentialStore, PathManager};
use history_sync_core::{CatalogCacheStorage, CursorStore};
use std::fs;

pub fn run_clear(all: bool, cursor: bool, catalog_cache: bool, credentials: bool, output: &Output) -> Result<()> {
    let (config, paths) = load_config()?;

    if !(all || cursor || catalog_cache || credentials) {
        output.warn("No clear option specified. Use --cursor, --catalog-cache, --credentials, or --all");
        output.info("\nExample: watchlog clear --cursor");
        return Ok(());
    }

    if all || cursor {
        clear_cursor(&paths, output)?;
    }
    if all || catalog_cache {
        let storage = CatalogCacheStorage::new(paths.catalog_cache_file(), config.tmdb.cache_ttl_days);
        let removed = storage.clear()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to remove catalog cache at {}: {}", storage.path().display(), e))?;
        if removed {
            output.success(format!("Cleared catalog cache: {}", storage.path().display()));
        } else {
            output.info("No catalog cache found to clear");
        }
    }
    if all || credentials {
        clear_credentials(&paths, output)?;
    }

    Ok(())
}

fn clear_cursor(paths: &PathManager, output: &Output) -> Result<()> {
    let store = CursorStore::new(paths.cursor_file());
    let removed = store.clear()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to remove cursor at {}: {}", store.path().display(), e))?;
    if removed {
        output.success("Cleared sync cursor (next sync fetches the full history)");
    } else {
        output.info("No sync cursor found to clear");
    }
    Ok(())
}

fn clear_credentials(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();
    if credentials_file.exists() {
        let mut store = CredentialStore::new(credentials_file.clone());
        store.load()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials: {}", e))?;
        let keys: Vec<String> = store
            .get_all_keys()
            .into_iter()
            .filter(|k| k.starts_with("trakt_"))
            .collect();
        for key in &keys {
            store.remove(key);
        }
        store.save()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;
        output.success(format!("Cleared {} stored credential(s): {}", keys.len(), credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }

    let rotated = paths.rotated_tokens_file();
    if rotated.exists() {
        fs::remove_file(&rotated)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to remove {}: {}", rotated.display(), e))?;
        output.success(format!("Removed rotated tokens: {}", rotated.display()));
    }
    Ok(())
}
