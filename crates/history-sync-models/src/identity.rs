use chrono::{DateTime, Utc};
use crate::watch_event::WatchEvent;

/// Cross-run identity of a single watch
///
/// Two watches are the same iff they share the subject, the watch time and,
/// for episodes, the season and episode number. The subject is expressed as
/// one of the subject's ids (`trakt:1`, `tmdb:2`, `imdb:tt3`, ...) or, when
/// the subject carries no ids at all, as a normalized title/year string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub subject: String,
    pub watched_at: DateTime<Utc>,
    pub episode: Option<(u32, u32)>,
}

impl IdentityKey {
    /// Key built from the most preferred subject id
    pub fn preferred(event: &WatchEvent) -> Self {
        let subject = Self::subjects(event)
            .into_iter()
            .next()
            .unwrap_or_else(|| Self::title_subject(event));
        Self::with_subject(event, subject)
    }

    /// One key per available subject id; a title key only when no ids exist
    pub fn all(event: &WatchEvent) -> Vec<Self> {
        Self::subjects(event)
            .into_iter()
            .map(|subject| Self::with_subject(event, subject))
            .collect()
    }

    fn subjects(event: &WatchEvent) -> Vec<String> {
        let ids = event.subject_ids().prefixed();
        if ids.is_empty() {
            vec![Self::title_subject(event)]
        } else {
            ids
        }
    }

    fn with_subject(event: &WatchEvent, subject: String) -> Self {
        let episode = match event {
            WatchEvent::Movie(_) => None,
            WatchEvent::Episode(episode) => Some((episode.season, episode.episode)),
        };
        Self {
            subject,
            watched_at: event.watched_at(),
            episode,
        }
    }

    fn title_subject(event: &WatchEvent) -> String {
        let (kind, title, year) = match event {
            WatchEvent::Movie(movie) => ("movie", &movie.title, movie.year),
            WatchEvent::Episode(episode) => ("show", &episode.show_title, episode.show_year),
        };
        let year = year.map(|y| y.to_string()).unwrap_or_else(|| "none".to_string());
        format!("{}:{}:{}", kind, title.trim().to_lowercase(), year)
    }
}
