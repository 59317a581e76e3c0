use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub trakt: TraktConfig,
    #[serde(default)]
    pub tmdb: TmdbConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathOverrides,
    /// Explicit start point, overrides the stored cursor (env only)
    #[serde(skip)]
    pub start_at_override: Option<String>,
    /// Initial tokens supplied through the environment (env only)
    #[serde(skip)]
    pub token_override: TokenOverride,
}

#[derive(Debug, Default, Clone)]
pub struct TokenOverride {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TraktConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_trakt_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TmdbConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tmdb_base_url")]
    pub api_base_url: String,
    /// Target display language for localized titles and overviews
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    #[serde(default = "default_poster_size")]
    pub poster_size: String,
    #[serde(default = "default_backdrop_size")]
    pub backdrop_size: String,
    #[serde(default = "default_still_size")]
    pub still_size: String,
    /// Ask the catalog for its image base URL and available sizes
    #[serde(default)]
    pub discover_image_config: bool,
    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,
    /// Keep the lookup cache on disk between runs
    #[serde(default)]
    pub persist_cache: bool,
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncOptions {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_cursor_margin_seconds")]
    pub cursor_margin_seconds: i64,
    #[serde(default = "default_true")]
    pub enrich: bool,
    /// Probe the account before fetching history
    #[serde(default = "default_true")]
    pub verify_session: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PathOverrides {
    pub history_file: Option<PathBuf>,
    pub cursor_file: Option<PathBuf>,
    pub rotated_tokens_file: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_trakt_base_url() -> String {
    "https://api.trakt.tv".to_string()
}

fn default_redirect_uri() -> String {
    "urn:ietf:wg:oauth:2.0:oob".to_string()
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_language() -> String {
    "de-DE".to_string()
}

fn default_image_base_url() -> String {
    "https://image.tmdb.org/t/p/".to_string()
}

fn default_poster_size() -> String {
    "w500".to_string()
}

fn default_backdrop_size() -> String {
    "w780".to_string()
}

fn default_still_size() -> String {
    "w300".to_string()
}

fn default_request_pause_ms() -> u64 {
    20
}

fn default_cache_ttl_days() -> u32 {
    7
}

fn default_page_size() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    5
}

fn default_cursor_margin_seconds() -> i64 {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_user_agent() -> String {
    concat!("watchlog/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for TraktConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: default_trakt_base_url(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_key: String::new(),
            api_base_url: default_tmdb_base_url(),
            language: default_language(),
            image_base_url: default_image_base_url(),
            poster_size: default_poster_size(),
            backdrop_size: default_backdrop_size(),
            still_size: default_still_size(),
            discover_image_config: false,
            request_pause_ms: default_request_pause_ms(),
            persist_cache: false,
            cache_ttl_days: default_cache_ttl_days(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            cursor_margin_seconds: default_cursor_margin_seconds(),
            enrich: default_true(),
            verify_session: default_true(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if present, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            tracing::debug!(path = ?path, "No config file, using defaults");
            Config::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides; the getter is injectable for tests
    pub fn apply_env_overrides<F>(&mut self, mut env: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut non_empty = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("TRAKT_CLIENT_ID") {
            self.trakt.client_id = v;
        }
        if let Some(v) = non_empty("TRAKT_CLIENT_SECRET") {
            self.trakt.client_secret = v;
        }
        if let Some(v) = non_empty("TMDB_API_KEY") {
            self.tmdb.api_key = v;
        }
        if let Some(v) = non_empty("TRAKT_HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            self.sync.page_size = v;
        }
        if let Some(v) = non_empty("TRAKT_HISTORY_PAGES").and_then(|v| v.parse().ok()) {
            self.sync.max_pages = v;
        }
        if let Some(v) = non_empty("TRAKT_START_AT_ISO") {
            self.start_at_override = Some(v);
        }
        if let Some(v) = non_empty("TRAKT_ACCESS_TOKEN") {
            self.token_override.access_token = Some(v);
        }
        if let Some(v) = non_empty("TRAKT_REFRESH_TOKEN") {
            self.token_override.refresh_token = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.is_trakt_configured() {
            return Err(anyhow::anyhow!(
                "Trakt client_id and client_secret are required (config [trakt] or TRAKT_CLIENT_ID/TRAKT_CLIENT_SECRET)"
            ));
        }
        if self.sync.page_size == 0 {
            return Err(anyhow::anyhow!("sync.page_size must be positive"));
        }
        if self.sync.max_pages == 0 {
            return Err(anyhow::anyhow!("sync.max_pages must be positive"));
        }
        if self.sync.cursor_margin_seconds < 0 {
            return Err(anyhow::anyhow!("sync.cursor_margin_seconds must be non-negative"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.retry.factor < 1.0 {
            return Err(anyhow::anyhow!("retry.factor must be >= 1.0"));
        }
        if let Some(ref start_at) = self.start_at_override {
            if chrono::DateTime::parse_from_rfc3339(start_at).is_err() {
                return Err(anyhow::anyhow!("TRAKT_START_AT_ISO is not an RFC 3339 timestamp: {}", start_at));
            }
        }
        Ok(())
    }

    pub fn is_trakt_configured(&self) -> bool {
        !self.trakt.client_id.is_empty()
            && self.trakt.client_id != "YOUR_CLIENT_ID"
            && !self.trakt.client_secret.is_empty()
            && self.trakt.client_secret != "YOUR_CLIENT_SECRET"
    }

    /// Enrichment runs only with an enabled catalog and a key
    pub fn is_tmdb_configured(&self) -> bool {
        self.tmdb.enabled && !self.tmdb.api_key.is_empty()
    }
}
