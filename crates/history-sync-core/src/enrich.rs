use history_sync_config::TmdbConfig;
use history_sync_models::{clean_imdb_id, EpisodeWatch, MovieWatch, WatchEvent};
use history_sync_sources::tmdb::api::{first_result_id, str_field, u32_field};
use history_sync_sources::{
    CatalogApi, CatalogRequest, ExternalSource, ImageConfig, ProgressTracker, RetryPolicy, SourceError,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use crate::catalog_cache::{CachedLookup, CatalogCache};

/// Adds catalog metadata to watch events.
///
/// Enrichment is best-effort: a failed or empty lookup leaves the fields it
/// would have filled untouched and never fails the event. Every lookup goes
/// through the owned [`CatalogCache`].
pub struct CatalogEnricher {
    api: Arc<dyn CatalogApi>,
    cache: CatalogCache,
    images: ImageConfig,
    language: String,
    request_pause: Duration,
    retry: RetryPolicy,
    discover_images: bool,
    images_discovered: bool,
    failures: Vec<&'static str>,
}

impl CatalogEnricher {
    pub fn new(api: Arc<dyn CatalogApi>, images: ImageConfig, language: String) -> Self {
        Self {
            api,
            cache: CatalogCache::new(),
            images,
            language,
            request_pause: Duration::ZERO,
            retry: RetryPolicy::default(),
            discover_images: false,
            images_discovered: false,
            failures: Vec::new(),
        }
    }

    pub fn from_config(api: Arc<dyn CatalogApi>, config: &TmdbConfig) -> Self {
        let images = ImageConfig {
            base_url: config.image_base_url.clone(),
            poster_size: config.poster_size.clone(),
            backdrop_size: config.backdrop_size.clone(),
            still_size: config.still_size.clone(),
        };
        Self::new(api, images, config.language.clone())
            .with_request_pause(Duration::from_millis(config.request_pause_ms))
            .with_image_discovery(config.discover_image_config)
    }

    pub fn with_cache(mut self, cache: CatalogCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_request_pause(mut self, pause: Duration) -> Self {
        self.request_pause = pause;
        self
    }

    /// Backoff for rate-limited and transient catalog failures
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_image_discovery(mut self, enabled: bool) -> Self {
        self.discover_images = enabled;
        self
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn into_cache(self) -> CatalogCache {
        self.cache
    }

    pub fn images(&self) -> &ImageConfig {
        &self.images
    }

    /// Enrich a batch in order, logging progress and a summary
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn enrich_batch(&mut self, events: Vec<WatchEvent>) -> Vec<WatchEvent> {
        let mut tracker = ProgressTracker::new(events.len(), 25);
        let mut enriched = Vec::with_capacity(events.len());

        for (idx, event) in events.into_iter().enumerate() {
            let before = event.clone();
            let after = self.enrich(event).await;

            for category in self.failures.drain(..) {
                tracker.record_failed_with_error(category);
            }
            if after == before {
                tracker.record_unchanged();
            } else {
                tracker.record_enriched();
            }
            log_missing_fields(&after);
            enriched.push(after);
            tracker.log_progress(idx + 1);
        }

        tracker.log_summary("Catalog enrichment");
        let stats = self.cache.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.entries,
            "Catalog cache usage"
        );
        enriched
    }

    /// Enrich one event; never fails
    pub async fn enrich(&mut self, event: WatchEvent) -> WatchEvent {
        self.discover_image_config().await;
        match event {
            WatchEvent::Movie(mut movie) => {
                self.enrich_movie(&mut movie).await;
                WatchEvent::Movie(movie)
            }
            WatchEvent::Episode(mut episode) => {
                self.enrich_episode(&mut episode).await;
                WatchEvent::Episode(episode)
            }
        }
    }

    async fn discover_image_config(&mut self) {
        if !self.discover_images || self.images_discovered {
            return;
        }
        self.images_discovered = true;
        if let Some(body) = self.lookup(CatalogRequest::Configuration).await {
            self.images = self.images.with_discovered(&body);
            info!(
                base_url = %self.images.base_url,
                poster = %self.images.poster_size,
                backdrop = %self.images.backdrop_size,
                still = %self.images.still_size,
                "Using catalog image configuration"
            );
        }
    }

    fn localized(&self) -> Option<String> {
        Some(self.language.clone())
    }

    async fn enrich_movie(&mut self, movie: &mut MovieWatch) {
        let id = match self.resolve_movie_id(movie).await {
            Some(id) => id,
            None => {
                debug!(title = %movie.title, "No catalog match for movie");
                return;
            }
        };
        movie.ids.tmdb = Some(id);

        let default = self.lookup(CatalogRequest::Movie { id, language: None }).await;
        let localized = self
            .lookup(CatalogRequest::Movie {
                id,
                language: self.localized(),
            })
            .await;

        if let Some(body) = &default {
            let enrichment = &mut movie.enrichment;
            enrichment.poster_url = self
                .images
                .poster_url(body.get("poster_path").and_then(Value::as_str))
                .or(enrichment.poster_url.take());
            enrichment.backdrop_url = self
                .images
                .backdrop_url(body.get("backdrop_path").and_then(Value::as_str))
                .or(enrichment.backdrop_url.take());
            enrichment.runtime = u32_field(body, "runtime").or(enrichment.runtime);
            if movie.title.trim().is_empty() {
                if let Some(title) = str_field(body, "title") {
                    movie.title = title;
                }
            }
            if movie.ids.imdb.is_none() {
                movie.ids.imdb = str_field(body, "imdb_id").as_deref().and_then(clean_imdb_id);
            }
        }

        if let Some(body) = &localized {
            let enrichment = &mut movie.enrichment;
            enrichment.title_localized = str_field(body, "title").or(enrichment.title_localized.take());
            enrichment.overview_localized = str_field(body, "overview").or(enrichment.overview_localized.take());
        }
    }

    async fn resolve_movie_id(&mut self, movie: &MovieWatch) -> Option<u32> {
        if let Some(id) = movie.ids.tmdb {
            return Some(id);
        }
        if let Some(id) = self.find_by_external_ids(movie.ids.imdb.as_deref(), movie.ids.tvdb, "movie_results").await {
            return Some(id);
        }
        if movie.title.trim().is_empty() {
            return None;
        }
        let body = self
            .lookup(CatalogRequest::SearchMovie {
                query: movie.title.clone(),
                year: movie.year,
                language: None,
            })
            .await?;
        first_result_id(&body, "results")
    }

    async fn resolve_show_id(&mut self, episode: &EpisodeWatch) -> Option<u32> {
        if let Some(id) = episode.show_ids.tmdb {
            return Some(id);
        }
        if let Some(id) = self
            .find_by_external_ids(episode.show_ids.imdb.as_deref(), episode.show_ids.tvdb, "tv_results")
            .await
        {
            return Some(id);
        }
        if episode.show_title.trim().is_empty() {
            return None;
        }
        let body = self
            .lookup(CatalogRequest::SearchShow {
                query: episode.show_title.clone(),
                year: episode.show_year,
                language: None,
            })
            .await?;
        first_result_id(&body, "results")
    }

    /// Reverse lookup by IMDb id, then by TVDB id
    async fn find_by_external_ids(&mut self, imdb: Option<&str>, tvdb: Option<u32>, field: &str) -> Option<u32> {
        let candidates = [
            imdb.map(|id| (id.to_string(), ExternalSource::Imdb)),
            tvdb.map(|id| (id.to_string(), ExternalSource::Tvdb)),
        ];
        for (external_id, source) in candidates.into_iter().flatten() {
            let request = CatalogRequest::FindByExternalId { external_id, source };
            if let Some(id) = self.lookup(request).await.and_then(|body| first_result_id(&body, field)) {
                return Some(id);
            }
        }
        None
    }

    async fn enrich_episode(&mut self, episode: &mut EpisodeWatch) {
        let show_id = match self.resolve_show_id(episode).await {
            Some(id) => id,
            None => {
                debug!(show = %episode.show_title, "No catalog match for show");
                return;
            }
        };
        episode.show_ids.tmdb = Some(show_id);

        let show_default = self.lookup(CatalogRequest::Show { id: show_id, language: None }).await;
        let show_localized = self
            .lookup(CatalogRequest::Show {
                id: show_id,
                language: self.localized(),
            })
            .await;

        let average_run_time = show_default.as_ref().and_then(average_run_time);
        {
            let enrichment = &mut episode.enrichment;
            if let Some(body) = &show_default {
                enrichment.show_total_episodes = u32_field(body, "number_of_episodes").or(enrichment.show_total_episodes);
            }
            enrichment.show_episode_run_time = average_run_time.or(enrichment.show_episode_run_time);
            if let Some(body) = &show_localized {
                enrichment.show_title_localized = str_field(body, "name").or(enrichment.show_title_localized.take());
            }

            let poster_path = image_path(&show_default, &show_localized, "poster_path");
            let backdrop_path = image_path(&show_default, &show_localized, "backdrop_path");
            if enrichment.show_poster_url.is_none() {
                enrichment.show_poster_url = self.images.poster_url(poster_path.as_deref());
            }
            if enrichment.show_backdrop_url.is_none() {
                enrichment.show_backdrop_url = self.images.backdrop_url(backdrop_path.as_deref());
            }
        }

        if episode.show_ids.imdb.is_none() || episode.show_ids.tvdb.is_none() {
            if let Some(body) = self.lookup(CatalogRequest::ShowExternalIds { show_id }).await {
                if episode.show_ids.imdb.is_none() {
                    episode.show_ids.imdb = str_field(&body, "imdb_id").as_deref().and_then(clean_imdb_id);
                }
                if episode.show_ids.tvdb.is_none() {
                    episode.show_ids.tvdb = u32_field(&body, "tvdb_id");
                }
            }
        }

        let (season, number) = (episode.season, episode.episode);
        let season_localized = self
            .lookup(CatalogRequest::Season {
                show_id,
                season,
                language: self.localized(),
            })
            .await;
        if let Some(count) = season_localized
            .as_ref()
            .and_then(|body| body.get("episodes"))
            .and_then(Value::as_array)
            .map(|episodes| episodes.len() as u32)
        {
            episode.enrichment.season_total_episodes = Some(count);
        }

        let episode_localized = self
            .lookup(CatalogRequest::Episode {
                show_id,
                season,
                episode: number,
                language: self.localized(),
            })
            .await;
        let episode_default = self
            .lookup(CatalogRequest::Episode {
                show_id,
                season,
                episode: number,
                language: None,
            })
            .await;

        let enrichment = &mut episode.enrichment;
        if let Some(body) = &episode_localized {
            enrichment.episode_title_localized = str_field(body, "name").or(enrichment.episode_title_localized.take());
            enrichment.episode_overview_localized =
                str_field(body, "overview").or(enrichment.episode_overview_localized.take());
        }
        let runtime = [&episode_localized, &episode_default]
            .into_iter()
            .flatten()
            .find_map(|body| u32_field(body, "runtime"));
        enrichment.episode_runtime = runtime
            .or(enrichment.episode_runtime)
            .or(enrichment.show_episode_run_time);
        if enrichment.episode_still_url.is_none() {
            let still_path = image_path(&episode_localized, &episode_default, "still_path");
            enrichment.episode_still_url = self.images.still_url(still_path.as_deref());
        }
        if episode.episode_title.is_none() {
            episode.episode_title = episode_default.as_ref().and_then(|body| str_field(body, "name"));
        }
    }

    /// Cached catalog call; failures that survive retrying are remembered as
    /// missing for this run
    async fn lookup(&mut self, request: CatalogRequest) -> Option<Value> {
        if let Some(cached) = self.cache.get(&request) {
            return cached.value().cloned();
        }

        match self.fetch(&request).await {
            Ok(Some(body)) => {
                self.cache.insert(&request, CachedLookup::Found(body.clone()));
                Some(body)
            }
            Ok(None) => {
                self.cache.insert(&request, CachedLookup::NotFound);
                None
            }
            Err(err) => {
                warn!(path = %request.path(), language = ?request.language(), "Catalog lookup failed: {}", err);
                self.failures.push(failure_category(&err));
                self.cache.insert(&request, CachedLookup::Failed);
                None
            }
        }
    }

    async fn fetch(&self, request: &CatalogRequest) -> Result<Option<Value>, SourceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.api.get(request).await;
            if !self.request_pause.is_zero() {
                tokio::time::sleep(self.request_pause).await;
            }
            match result {
                Err(err) if self.retry.should_retry(&err, attempts) => {
                    let delay = self.retry.delay_for(&err, attempts - 1);
                    debug!(
                        path = %request.path(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Catalog lookup failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(self.retry.give_up(err, attempts)),
                Ok(body) => return Ok(body),
            }
        }
    }
}

fn failure_category(err: &SourceError) -> &'static str {
    match err {
        SourceError::FetchFailed { last, .. } => failure_category(last),
        SourceError::RateLimited { .. } => "rate_limited",
        SourceError::Unauthorized | SourceError::AuthExpired(_) => "unauthorized",
        SourceError::Transient(_) => "transient",
        SourceError::Decode(_) => "decode",
        SourceError::Http { .. } => "http",
        _ => "other",
    }
}

/// Rounded mean of the show's `episode_run_time` list
fn average_run_time(body: &Value) -> Option<u32> {
    let times: Vec<u64> = body
        .get("episode_run_time")?
        .as_array()?
        .iter()
        .filter_map(Value::as_u64)
        .collect();
    if times.is_empty() {
        return None;
    }
    let mean = times.iter().sum::<u64>() as f64 / times.len() as f64;
    Some(mean.round() as u32)
}

/// Image path from the first body that has one
fn image_path(primary: &Option<Value>, fallback: &Option<Value>, field: &str) -> Option<String> {
    [primary, fallback]
        .into_iter()
        .flatten()
        .find_map(|body| str_field(body, field))
}

fn log_missing_fields(event: &WatchEvent) {
    match event {
        WatchEvent::Movie(movie) => {
            if movie.ids.imdb.is_none() || movie.enrichment.poster_url.is_none() {
                debug!(
                    title = %movie.title,
                    imdb = ?movie.ids.imdb,
                    poster = ?movie.enrichment.poster_url,
                    "Movie missing fields"
                );
            }
        }
        WatchEvent::Episode(episode) => {
            if episode.show_ids.imdb.is_none()
                || episode.show_ids.tvdb.is_none()
                || episode.enrichment.episode_title_localized.is_none()
            {
                debug!(
                    show = %episode.show_title,
                    season = episode.season,
                    episode = episode.episode,
                    imdb = ?episode.show_ids.imdb,
                    tvdb = ?episode.show_ids.tvdb,
                    episode_title_localized = ?episode.enrichment.episode_title_localized,
                    "Episode missing fields"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;
