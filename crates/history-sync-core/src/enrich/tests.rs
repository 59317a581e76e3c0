use super::*;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use history_sync_models::{EpisodeEnrichment, MovieEnrichment, PrimaryIds};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

enum Canned {
    Body(Value),
    Fail,
    /// Rate-limited this many times, then the body
    Flaky(Mutex<u32>, Value),
}

/// In-memory catalog; unknown requests answer not-found
#[derive(Default)]
struct FakeCatalog {
    responses: HashMap<CatalogRequest, Canned>,
    calls: Mutex<Vec<CatalogRequest>>,
}

impl FakeCatalog {
    fn with(mut self, request: CatalogRequest, body: Value) -> Self {
        self.responses.insert(request, Canned::Body(body));
        self
    }

    fn failing(mut self, request: CatalogRequest) -> Self {
        self.responses.insert(request, Canned::Fail);
        self
    }

    fn rate_limited_then(mut self, request: CatalogRequest, times: u32, body: Value) -> Self {
        self.responses.insert(request, Canned::Flaky(Mutex::new(times), body));
        self
    }

    fn calls(&self) -> Vec<CatalogRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, request: &CatalogRequest) -> usize {
        self.calls().iter().filter(|r| *r == request).count()
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn get(&self, request: &CatalogRequest) -> Result<Option<Value>, SourceError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.responses.get(request) {
            Some(Canned::Body(body)) => Ok(Some(body.clone())),
            Some(Canned::Fail) => Err(SourceError::Transient("connection reset".to_string())),
            Some(Canned::Flaky(remaining, body)) => {
                let mut remaining = remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::RateLimited { retry_after: None });
                }
                Ok(Some(body.clone()))
            }
            None => Ok(None),
        }
    }
}

fn images() -> ImageConfig {
    ImageConfig {
        base_url: "https://img/".to_string(),
        poster_size: "w500".to_string(),
        backdrop_size: "w780".to_string(),
        still_size: "w300".to_string(),
    }
}

fn enricher(catalog: &Arc<FakeCatalog>) -> CatalogEnricher {
    CatalogEnricher::new(catalog.clone(), images(), "de-DE".to_string()).with_retry_policy(RetryPolicy::immediate(2))
}

fn de() -> Option<String> {
    Some("de-DE".to_string())
}

fn heat(ids: PrimaryIds) -> WatchEvent {
    WatchEvent::Movie(MovieWatch {
        remote_event_id: Some(1),
        watched_at: Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap(),
        action: Some("watch".to_string()),
        title: "Heat".to_string(),
        year: Some(1995),
        ids,
        enrichment: MovieEnrichment::default(),
    })
}

fn dark(episode: u32, show_ids: PrimaryIds) -> WatchEvent {
    WatchEvent::Episode(EpisodeWatch {
        remote_event_id: Some(100 + u64::from(episode)),
        watched_at: Utc.with_ymd_and_hms(2024, 1, 1, 20, episode, 0).unwrap(),
        action: Some("watch".to_string()),
        show_title: "Dark".to_string(),
        show_year: Some(2017),
        show_ids,
        season: 1,
        episode,
        episode_title: None,
        ids: PrimaryIds::default(),
        enrichment: EpisodeEnrichment::default(),
    })
}

fn tmdb(id: u32) -> PrimaryIds {
    PrimaryIds {
        tmdb: Some(id),
        ..PrimaryIds::default()
    }
}

fn movie_catalog() -> FakeCatalog {
    FakeCatalog::default()
        .with(
            CatalogRequest::Movie { id: 949, language: None },
            json!({"title": "Heat", "runtime": 170, "poster_path": "/p.jpg", "backdrop_path": "/b.jpg", "imdb_id": "tt0113277"}),
        )
        .with(
            CatalogRequest::Movie { id: 949, language: de() },
            json!({"title": "Heat (DE)", "overview": "Ein Raub."}),
        )
}

#[tokio::test]
async fn test_movie_with_known_id() {
    let catalog = Arc::new(movie_catalog());
    let mut enricher = enricher(&catalog);

    let event = enricher.enrich(heat(tmdb(949))).await;
    let WatchEvent::Movie(movie) = event else { panic!("expected movie") };
    assert_eq!(movie.ids.imdb.as_deref(), Some("tt0113277"));
    assert_eq!(movie.enrichment.runtime, Some(170));
    assert_eq!(movie.enrichment.poster_url.as_deref(), Some("https://img/w500/p.jpg"));
    assert_eq!(movie.enrichment.backdrop_url.as_deref(), Some("https://img/w780/b.jpg"));
    assert_eq!(movie.enrichment.title_localized.as_deref(), Some("Heat (DE)"));
    assert_eq!(movie.enrichment.overview_localized.as_deref(), Some("Ein Raub."));
    assert_eq!(catalog.calls().len(), 2);
}

#[tokio::test]
async fn test_movie_resolved_by_imdb_then_search() {
    let catalog = Arc::new(
        movie_catalog()
            .with(
                CatalogRequest::FindByExternalId {
                    external_id: "tt0113277".to_string(),
                    source: ExternalSource::Imdb,
                },
                json!({"movie_results": [{"id": 949}], "tv_results": []}),
            )
            .with(
                CatalogRequest::SearchMovie {
                    query: "Heat".to_string(),
                    year: Some(1995),
                    language: None,
                },
                json!({"results": [{"id": 949}, {"id": 1}]}),
            ),
    );
    let mut enricher = enricher(&catalog);

    let by_imdb = enricher
        .enrich(heat(PrimaryIds {
            imdb: Some("tt0113277".to_string()),
            ..PrimaryIds::default()
        }))
        .await;
    assert_eq!(by_imdb.subject_ids().tmdb, Some(949));

    let by_search = enricher.enrich(heat(PrimaryIds::default())).await;
    assert_eq!(by_search.subject_ids().tmdb, Some(949));
    assert_eq!(by_search.subject_ids().imdb.as_deref(), Some("tt0113277"));
    // movie details were fetched once and reused for the second event
    assert_eq!(catalog.count(&CatalogRequest::Movie { id: 949, language: None }), 1);
}

#[tokio::test]
async fn test_failed_lookups_keep_other_fields() {
    let catalog = Arc::new(
        FakeCatalog::default()
            .failing(CatalogRequest::Movie { id: 949, language: None })
            .failing(CatalogRequest::Movie { id: 949, language: de() }),
    );
    let mut enricher = enricher(&catalog);

    let original = heat(tmdb(949));
    let event = enricher.enrich(original.clone()).await;
    assert_eq!(event, original);

    // two attempts per lookup, then the failure is remembered for the run
    let again = enricher.enrich(original.clone()).await;
    assert_eq!(again, original);
    assert_eq!(catalog.calls().len(), 4);
}

#[tokio::test]
async fn test_rate_limited_lookup_is_retried() {
    let catalog = Arc::new(
        FakeCatalog::default()
            .rate_limited_then(
                CatalogRequest::Movie { id: 949, language: None },
                1,
                json!({"runtime": 170, "poster_path": "/p.jpg"}),
            )
            .with(
                CatalogRequest::Movie { id: 949, language: de() },
                json!({"title": "Heat", "overview": "Los Angeles"}),
            ),
    );
    let mut enricher = enricher(&catalog);

    let events = enricher.enrich_batch(vec![heat(tmdb(949)), heat(tmdb(949))]).await;
    for enriched in &events {
        match enriched {
            WatchEvent::Movie(m) => {
                assert_eq!(m.enrichment.runtime, Some(170));
                assert_eq!(m.enrichment.poster_url.as_deref(), Some("https://img/w500/p.jpg"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(catalog.count(&CatalogRequest::Movie { id: 949, language: None }), 2);
    assert_eq!(enricher.cache().stats().entries, 2);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_degrades() {
    let catalog = Arc::new(FakeCatalog::default().rate_limited_then(
        CatalogRequest::Movie { id: 949, language: None },
        5,
        json!({"runtime": 170}),
    ));
    let mut enricher = enricher(&catalog);

    let event = enricher.enrich(heat(tmdb(949))).await;
    match event {
        WatchEvent::Movie(m) => assert_eq!(m.enrichment.runtime, None),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(catalog.count(&CatalogRequest::Movie { id: 949, language: None }), 2);
}

#[tokio::test]
async fn test_partial_failure_degrades_only_its_fields() {
    let catalog = Arc::new(
        FakeCatalog::default()
            .with(
                CatalogRequest::Movie { id: 949, language: None },
                json!({"runtime": 170, "poster_path": "/p.jpg"}),
            )
            .failing(CatalogRequest::Movie { id: 949, language: de() }),
    );
    let mut enricher = enricher(&catalog);

    let WatchEvent::Movie(movie) = enricher.enrich(heat(tmdb(949))).await else { panic!("expected movie") };
    assert_eq!(movie.enrichment.runtime, Some(170));
    assert!(movie.enrichment.poster_url.is_some());
    assert_eq!(movie.enrichment.title_localized, None);
    assert_eq!(movie.title, "Heat");
}

fn show_catalog() -> FakeCatalog {
    FakeCatalog::default()
        .with(
            CatalogRequest::Show { id: 70523, language: None },
            json!({
                "name": "Dark",
                "number_of_episodes": 26,
                "episode_run_time": [50, 55],
                "poster_path": "/dark.jpg"
            }),
        )
        .with(
            CatalogRequest::Show { id: 70523, language: de() },
            json!({"name": "Dark (DE)", "backdrop_path": "/dark-b.jpg"}),
        )
        .with(
            CatalogRequest::ShowExternalIds { show_id: 70523 },
            json!({"imdb_id": "tt5753856", "tvdb_id": 334824}),
        )
        .with(
            CatalogRequest::Season { show_id: 70523, season: 1, language: de() },
            json!({"episodes": [{}, {}, {}, {}, {}, {}, {}, {}, {}, {}]}),
        )
        .with(
            CatalogRequest::Episode { show_id: 70523, season: 1, episode: 2, language: de() },
            json!({"name": "Lügen", "overview": "Jonas...", "still_path": "/s2.jpg"}),
        )
        .with(
            CatalogRequest::Episode { show_id: 70523, season: 1, episode: 2, language: None },
            json!({"name": "Lies", "runtime": 48}),
        )
}

#[tokio::test]
async fn test_episode_enrichment() {
    let catalog = Arc::new(show_catalog());
    let mut enricher = enricher(&catalog);

    let WatchEvent::Episode(episode) = enricher.enrich(dark(2, tmdb(70523))).await else { panic!("expected episode") };
    let e = &episode.enrichment;
    assert_eq!(e.show_total_episodes, Some(26));
    assert_eq!(e.show_episode_run_time, Some(53));
    assert_eq!(e.show_title_localized.as_deref(), Some("Dark (DE)"));
    assert_eq!(e.show_poster_url.as_deref(), Some("https://img/w500/dark.jpg"));
    assert_eq!(e.show_backdrop_url.as_deref(), Some("https://img/w780/dark-b.jpg"));
    assert_eq!(e.season_total_episodes, Some(10));
    assert_eq!(e.episode_title_localized.as_deref(), Some("Lügen"));
    assert_eq!(e.episode_overview_localized.as_deref(), Some("Jonas..."));
    assert_eq!(e.episode_still_url.as_deref(), Some("https://img/w300/s2.jpg"));
    assert_eq!(e.episode_runtime, Some(48));
    assert_eq!(episode.episode_title.as_deref(), Some("Lies"));
    assert_eq!(episode.show_ids.imdb.as_deref(), Some("tt5753856"));
    assert_eq!(episode.show_ids.tvdb, Some(334824));
}

#[tokio::test]
async fn test_episode_runtime_falls_back_to_show_average() {
    let catalog = Arc::new(show_catalog());
    let mut enricher = enricher(&catalog);

    let WatchEvent::Episode(episode) = enricher.enrich(dark(3, tmdb(70523))).await else { panic!("expected episode") };
    assert_eq!(episode.enrichment.episode_runtime, Some(53));
    assert_eq!(episode.enrichment.episode_title_localized, None);
    assert_eq!(episode.episode_title, None);
}

#[tokio::test]
async fn test_shared_show_is_fetched_once_per_language() {
    let catalog = Arc::new(show_catalog());
    let mut enricher = enricher(&catalog);

    let events = vec![dark(2, tmdb(70523)), dark(3, tmdb(70523))];
    let enriched = enricher.enrich_batch(events).await;
    assert_eq!(enriched.len(), 2);

    assert_eq!(catalog.count(&CatalogRequest::Show { id: 70523, language: None }), 1);
    assert_eq!(catalog.count(&CatalogRequest::Show { id: 70523, language: de() }), 1);
    assert_eq!(catalog.count(&CatalogRequest::ShowExternalIds { show_id: 70523 }), 1);
    assert_eq!(
        catalog.count(&CatalogRequest::Season { show_id: 70523, season: 1, language: de() }),
        1
    );
    assert!(enricher.cache().stats().hits >= 4);
}

#[tokio::test]
async fn test_unresolvable_show_is_left_alone() {
    let catalog = Arc::new(FakeCatalog::default());
    let mut enricher = enricher(&catalog);

    let original = dark(1, PrimaryIds::default());
    let event = enricher.enrich(original.clone()).await;
    assert_eq!(event, original);
    // only the title search was attempted
    assert_eq!(catalog.calls().len(), 1);
}

#[tokio::test]
async fn test_image_configuration_discovery() {
    let catalog = Arc::new(movie_catalog().with(
        CatalogRequest::Configuration,
        json!({"images": {"secure_base_url": "https://cdn/", "poster_sizes": ["w92", "original"]}}),
    ));
    let mut enricher = enricher(&catalog).with_image_discovery(true);

    let WatchEvent::Movie(movie) = enricher.enrich(heat(tmdb(949))).await else { panic!("expected movie") };
    assert_eq!(movie.enrichment.poster_url.as_deref(), Some("https://cdn/original/p.jpg"));
    enricher.enrich(heat(tmdb(949))).await;
    assert_eq!(catalog.count(&CatalogRequest::Configuration), 1);
}
