use super::load_config;
use crate::output::Output;
use clap::{ArgAction, Args};
use color_eyre::Result;
use history_sync_config::CredentialStore;
use history_sync_core::{
    CatalogCacheStorage, CatalogEnricher, CursorStore, EventLog, FileCredentialSink, RunOptions, SyncOrchestrator,
    SyncReport,
};
use history_sync_sources::{CredentialManager, RetryPolicy, TmdbClient, TraktClient};
use serde_json::json;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Fetch from this RFC 3339 timestamp instead of the stored cursor
    #[arg(long, value_name = "ISO")]
    start_at: Option<String>,

    /// History entries per page
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,

    /// Upper bound on pages fetched in one run
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Skip catalog enrichment
    #[arg(long, action = ArgAction::SetTrue)]
    no_enrich: bool,

    /// Fetch and reconcile, but leave the log and cursor untouched
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

pub async fn run_sync(args: SyncArgs, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");

    let (mut config, paths) = load_config()?;
    if let Some(start_at) = args.start_at {
        config.start_at_override = Some(start_at);
    }
    if let Some(page_size) = args.page_size {
        config.sync.page_size = page_size;
    }
    if let Some(max_pages) = args.max_pages {
        config.sync.max_pages = max_pages;
    }
    if args.no_enrich {
        config.sync.enrich = false;
    }
    config.validate()
        .map_err(|e| color_eyre::eyre::eyre!("Configuration validation failed: {}", e))?;
    paths.ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create data directories: {}", e))?;

    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store.load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    let credential = cred_store.trakt_credential(&config.token_override).ok_or_else(|| {
        color_eyre::eyre::eyre!(
            "No Trakt refresh token found. Set TRAKT_REFRESH_TOKEN or add trakt_refresh_token to {}",
            credentials_file.display()
        )
    })?;

    let trakt = TraktClient::from_config(&config.trakt, &config.http)?;
    let sink = FileCredentialSink::new(paths.rotated_tokens_file()).with_store(cred_store);
    let credentials = CredentialManager::new(credential, Box::new(trakt.token_endpoint()), Box::new(sink));

    let cache_storage = config
        .tmdb
        .persist_cache
        .then(|| CatalogCacheStorage::new(paths.catalog_cache_file(), config.tmdb.cache_ttl_days));

    let enricher = if !config.sync.enrich {
        None
    } else if !config.is_tmdb_configured() {
        tracing::warn!("TMDB is not configured, events are stored without catalog metadata");
        None
    } else {
        let tmdb = TmdbClient::from_config(&config.tmdb, &config.http)?;
        let mut enricher = CatalogEnricher::from_config(Arc::new(tmdb), &config.tmdb)
            .with_retry_policy(RetryPolicy::from(&config.retry));
        if let Some(storage) = &cache_storage {
            match storage.load() {
                Ok(cache) => enricher = enricher.with_cache(cache),
                Err(e) => tracing::warn!("Catalog cache unavailable, starting empty: {}", e),
            }
        }
        Some(enricher)
    };

    let mut options = RunOptions::from_config(&config)?;
    options.dry_run = args.dry_run;

    let mut orchestrator = SyncOrchestrator::new(
        Arc::new(trakt),
        credentials,
        EventLog::new(paths.history_file(), paths.backup_dir()),
        CursorStore::new(paths.cursor_file()),
    )
    .with_enricher(enricher)
    .with_retry_policy(RetryPolicy::from(&config.retry))
    .with_options(options);

    let report = orchestrator.run().await?;

    if let (Some(storage), Some(enricher)) = (&cache_storage, orchestrator.enricher()) {
        if !args.dry_run && enricher.cache().is_dirty() {
            if let Err(e) = storage.save(enricher.cache()) {
                output.warn(format!("Failed to save catalog cache: {}", e));
            }
        }
    }

    print_report(&report, output);
    Ok(())
}

fn print_report(report: &SyncReport, output: &Output) {
    if !output.is_human() {
        output.json(&json!({
            "success": true,
            "report": report,
        }));
        return;
    }

    let watermark = |w: Option<history_sync_models::Watermark>| w.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string());
    output.key_value_table(
        if report.dry_run { "Sync (dry run)" } else { "Sync" },
        &[
            ("Pages", report.pages.to_string()),
            ("Fetched", report.fetched.to_string()),
            ("Skipped", report.skipped.to_string()),
            ("Already logged", report.duplicates.to_string()),
            (if report.dry_run { "Would append" } else { "Appended" }, report.appended.to_string()),
            ("Cursor before", watermark(report.watermark_before)),
            ("Cursor after", watermark(report.watermark_after)),
            ("Backfill until", watermark(report.backfill_until)),
            ("Token refreshed", report.token_refreshed.to_string()),
        ],
    );
    for label in &report.appended_labels {
        output.info(format!("  + {}", label));
    }

    if report.truncated {
        output.warn("Stopped at the page limit; run sync again to fetch older history");
    }

    let verb = if report.dry_run { "would append" } else { "appended" };
    output.success(format!(
        "Sync completed: {} {} in {:.1}s",
        verb,
        report.appended,
        report.duration_ms as f64 / 1000.0
    ));
}
