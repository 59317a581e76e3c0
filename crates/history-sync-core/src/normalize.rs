use chrono::{DateTime, Utc};
use history_sync_models::{EpisodeEnrichment, EpisodeWatch, MovieEnrichment, MovieWatch, WatchEvent};
use history_sync_sources::RawHistoryItem;
use tracing::{debug, warn};

/// Turn one raw history entry into a typed event.
///
/// Entries of unknown type, without a usable `watched_at`, or missing the
/// payload their type requires are skipped with a diagnostic.
pub fn normalize(raw: &RawHistoryItem) -> Option<WatchEvent> {
    let kind = raw.item_type.as_deref().unwrap_or_default();
    if kind != "movie" && kind != "episode" {
        debug!(id = ?raw.id, kind, "Skipping history entry of unsupported type");
        return None;
    }

    let watched_at = match raw.watched_at.as_deref().and_then(parse_timestamp) {
        Some(ts) => ts,
        None => {
            warn!(id = ?raw.id, watched_at = ?raw.watched_at, "Skipping history entry without a valid watched_at");
            return None;
        }
    };

    let action = raw.action.clone().filter(|a| !a.is_empty());

    if kind == "movie" {
        let movie = match &raw.movie {
            Some(movie) => movie,
            None => {
                warn!(id = ?raw.id, "Skipping movie entry without movie data");
                return None;
            }
        };
        return Some(WatchEvent::Movie(MovieWatch {
            remote_event_id: raw.id,
            watched_at,
            action,
            title: movie.title.clone().unwrap_or_default(),
            year: movie.year,
            ids: movie.ids.to_primary_ids(),
            enrichment: MovieEnrichment::default(),
        }));
    }

    let (show, episode) = match (&raw.show, &raw.episode) {
        (Some(show), Some(episode)) => (show, episode),
        _ => {
            warn!(id = ?raw.id, "Skipping episode entry without show or episode data");
            return None;
        }
    };
    let (season, number) = match (episode.season, episode.number) {
        (Some(season), Some(number)) => (season, number),
        _ => {
            warn!(id = ?raw.id, show = ?show.title, "Skipping episode entry without season/number");
            return None;
        }
    };

    Some(WatchEvent::Episode(EpisodeWatch {
        remote_event_id: raw.id,
        watched_at,
        action,
        show_title: show.title.clone().unwrap_or_default(),
        show_year: show.year,
        show_ids: show.ids.to_primary_ids(),
        season,
        episode: number,
        episode_title: episode.title.clone().filter(|t| !t.is_empty()),
        ids: episode.ids.to_primary_ids(),
        enrichment: EpisodeEnrichment::default(),
    }))
}

/// Normalize a fetched batch, dropping what cannot be used
pub fn normalize_batch(items: &[RawHistoryItem]) -> Vec<WatchEvent> {
    let events: Vec<WatchEvent> = items.iter().filter_map(normalize).collect();
    let skipped = items.len() - events.len();
    if skipped > 0 {
        debug!(skipped, kept = events.len(), "Normalized history batch");
    }
    events
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
