use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::enrichment::{EpisodeEnrichment, MovieEnrichment};
use crate::identity::IdentityKey;
use crate::primary_ids::PrimaryIds;

/// One discrete watch action, normalized from the activity service
///
/// Persisted as a flat record with a `type` discriminator. Records become
/// immutable once they are appended to the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatchEvent {
    Movie(MovieWatch),
    Episode(EpisodeWatch),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieWatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_event_id: Option<u64>,
    pub watched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: PrimaryIds,
    #[serde(flatten)]
    pub enrichment: MovieEnrichment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeWatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_event_id: Option<u64>,
    pub watched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub show_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_year: Option<u32>,
    /// Ids of the owning show; the show is the subject of an episode watch
    #[serde(default)]
    pub show_ids: PrimaryIds,
    pub season: u32,
    pub episode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    /// Ids of the episode itself
    #[serde(default)]
    pub ids: PrimaryIds,
    #[serde(flatten)]
    pub enrichment: EpisodeEnrichment,
}

impl WatchEvent {
    pub fn watched_at(&self) -> DateTime<Utc> {
        match self {
            WatchEvent::Movie(movie) => movie.watched_at,
            WatchEvent::Episode(episode) => episode.watched_at,
        }
    }

    pub fn remote_event_id(&self) -> Option<u64> {
        match self {
            WatchEvent::Movie(movie) => movie.remote_event_id,
            WatchEvent::Episode(episode) => episode.remote_event_id,
        }
    }

    /// Ids of the subject: the movie itself, or the show an episode belongs to
    pub fn subject_ids(&self) -> &PrimaryIds {
        match self {
            WatchEvent::Movie(movie) => &movie.ids,
            WatchEvent::Episode(episode) => &episode.show_ids,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Movie(_) => "movie",
            WatchEvent::Episode(_) => "episode",
        }
    }

    /// Short human label for logs, e.g. `Heat (1995)` or `Dark S01E02`
    pub fn label(&self) -> String {
        match self {
            WatchEvent::Movie(movie) => match movie.year {
                Some(year) => format!("{} ({})", movie.title, year),
                None => movie.title.clone(),
            },
            WatchEvent::Episode(episode) => format!(
                "{} S{:02}E{:02}",
                episode.show_title, episode.season, episode.episode
            ),
        }
    }

    /// The preferred identity key of this watch
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::preferred(self)
    }

    /// Every identity key this watch can be matched by
    pub fn identity_keys(&self) -> Vec<IdentityKey> {
        IdentityKey::all(self)
    }
}

/// Sort newest first by watch time, the order the page renderer expects
pub fn sort_newest_first(events: &mut [WatchEvent]) {
    events.sort_by(|a, b| b.watched_at().cmp(&a.watched_at()));
}
