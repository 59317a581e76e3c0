use super::{load_config, mask_string};
use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::Result;
use history_sync_config::{Config, CredentialStore, PathManager};
use serde_json::json;

pub fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Init { force } => init_config(force, output),
    }
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let (config, paths) = load_config()?;
    let secret = |s: &str| if full { s.to_string() } else { mask_string(s) };

    let mut cred_store = CredentialStore::new(paths.credentials_file());
    if let Err(e) = cred_store.load() {
        output.warn(format!("Credentials file unreadable: {}", e));
    }
    let credential = cred_store.trakt_credential(&config.token_override);
    let access = credential.as_ref().map(|c| secret(&c.access_token)).unwrap_or_else(|| "<not set>".to_string());
    let refresh = credential.as_ref().map(|c| secret(&c.refresh_token)).unwrap_or_else(|| "<not set>".to_string());

    if !output.is_human() {
        output.json(&json!({
            "config_file": paths.config_file().display().to_string(),
            "config_file_exists": paths.config_file().exists(),
            "trakt": {
                "client_id": secret(&config.trakt.client_id),
                "client_secret": secret(&config.trakt.client_secret),
                "api_base_url": config.trakt.api_base_url,
                "access_token": access,
                "refresh_token": refresh,
            },
            "tmdb": {
                "enabled": config.tmdb.enabled,
                "api_key": secret(&config.tmdb.api_key),
                "language": config.tmdb.language,
                "discover_image_config": config.tmdb.discover_image_config,
                "persist_cache": config.tmdb.persist_cache,
            },
            "sync": {
                "page_size": config.sync.page_size,
                "max_pages": config.sync.max_pages,
                "cursor_margin_seconds": config.sync.cursor_margin_seconds,
                "enrich": config.sync.enrich,
                "verify_session": config.sync.verify_session,
                "start_at_override": config.start_at_override,
            },
            "paths": {
                "history_file": paths.history_file().display().to_string(),
                "cursor_file": paths.cursor_file().display().to_string(),
                "rotated_tokens_file": paths.rotated_tokens_file().display().to_string(),
                "backup_dir": paths.backup_dir().display().to_string(),
            },
        }));
        return Ok(());
    }

    if !paths.config_file().exists() {
        output.warn(format!(
            "No configuration file at {}; showing defaults and environment overrides. Run 'watchlog config init' to create one.",
            paths.config_file().display()
        ));
    }

    output.key_value_table(
        "Trakt",
        &[
            ("Client ID", secret(&config.trakt.client_id)),
            ("Client Secret", secret(&config.trakt.client_secret)),
            ("API", config.trakt.api_base_url.clone()),
            ("Access token", access),
            ("Refresh token", refresh),
        ],
    );
    output.key_value_table(
        "TMDB",
        &[
            ("Enabled", config.tmdb.enabled.to_string()),
            ("API key", secret(&config.tmdb.api_key)),
            ("Language", config.tmdb.language.clone()),
            ("Discover image config", config.tmdb.discover_image_config.to_string()),
            ("Persist cache", format!("{} ({} days)", config.tmdb.persist_cache, config.tmdb.cache_ttl_days)),
        ],
    );
    output.key_value_table(
        "Sync",
        &[
            ("Page size", config.sync.page_size.to_string()),
            ("Max pages", config.sync.max_pages.to_string()),
            ("Cursor margin", format!("{}s", config.sync.cursor_margin_seconds)),
            ("Enrich", config.sync.enrich.to_string()),
            ("Verify session", config.sync.verify_session.to_string()),
            ("Start override", config.start_at_override.clone().unwrap_or_else(|| "-".to_string())),
            ("Retry", format!("{} attempts, {}ms x{}", config.retry.max_attempts, config.retry.base_delay_ms, config.retry.factor)),
        ],
    );
    output.key_value_table(
        "Paths",
        &[
            ("Config", paths.config_file().display().to_string()),
            ("History", paths.history_file().display().to_string()),
            ("Cursor", paths.cursor_file().display().to_string()),
            ("Rotated tokens", paths.rotated_tokens_file().display().to_string()),
            ("Backups", paths.backup_dir().display().to_string()),
        ],
    );
    Ok(())
}

fn init_config(force: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();
    if config_file.exists() && !force {
        output.warn(format!("{} already exists (use --force to overwrite)", config_file.display()));
        return Ok(());
    }
    Config::default()
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;
    output.success(format!("Wrote default configuration to {}", config_file.display()));
    Ok(())
}
