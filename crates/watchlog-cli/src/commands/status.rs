use super::load_config;
use crate::output::Output;
use color_eyre::Result;
use history_sync_core::{CatalogCacheStorage, CursorStore, EventLog};
use serde_json::json;

pub fn run_status(output: &Output) -> Result<()> {
    let (config, paths) = load_config()?;

    let log = EventLog::new(paths.history_file(), paths.backup_dir());
    let store = CursorStore::new(paths.cursor_file());
    let cursor = store.load();
    let backfill = store.load_backfill();
    let events = log.load_newest_first();
    let newest = events.first();
    let movies = events.iter().filter(|e| e.kind() == "movie").count();

    let cache_bytes = if config.tmdb.persist_cache {
        CatalogCacheStorage::new(paths.catalog_cache_file(), config.tmdb.cache_ttl_days)
            .size()
            .ok()
    } else {
        None
    };

    if !output.is_human() {
        output.json(&json!({
            "cursor": cursor.map(|c| c.to_string()),
            "backfill_until": backfill.map(|b| b.end_at.to_string()),
            "history_file": log.path().display().to_string(),
            "records": events.len(),
            "movies": movies,
            "episodes": events.len() - movies,
            "newest": newest.map(|e| json!({
                "label": e.label(),
                "watched_at": e.watched_at().to_rfc3339(),
            })),
            "catalog_cache_bytes": cache_bytes,
            "trakt_configured": config.is_trakt_configured(),
            "tmdb_configured": config.is_tmdb_configured(),
        }));
        return Ok(());
    }

    let yes_no = |b: bool| if b { "yes".to_string() } else { "no".to_string() };
    output.key_value_table(
        "Status",
        &[
            ("Cursor", cursor.map(|c| c.to_string()).unwrap_or_else(|| "<none, next sync starts from the beginning>".to_string())),
            (
                "Backfill",
                backfill
                    .map(|b| format!("older history pending before {}", b.end_at))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("History file", log.path().display().to_string()),
            ("Records", format!("{} ({} movies, {} episodes)", events.len(), movies, events.len() - movies)),
            (
                "Newest",
                newest
                    .map(|e| format!("{} @ {}", e.label(), e.watched_at().format("%Y-%m-%d %H:%M UTC")))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Catalog cache", cache_bytes.map(|b| format!("{} bytes", b)).unwrap_or_else(|| "-".to_string())),
            ("Trakt configured", yes_no(config.is_trakt_configured())),
            ("TMDB configured", yes_no(config.is_tmdb_configured())),
        ],
    );
    Ok(())
}
