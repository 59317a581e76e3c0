use serde::{Deserialize, Serialize};

/// Cross-service identifiers for a watched subject
///
/// Aggregates the activity-service id (Trakt), the catalog id (TMDB) and the
/// external database ids (IMDB, TVDB) plus the activity-service slug. Every
/// key is optional; a record may carry any subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PrimaryIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl PrimaryIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in missing ids from `other`; values already present are kept.
    pub fn merge(&mut self, other: &PrimaryIds) {
        if self.trakt.is_none() {
            self.trakt = other.trakt;
        }
        if self.tmdb.is_none() {
            self.tmdb = other.tmdb;
        }
        if self.imdb.is_none() {
            self.imdb = other.imdb.clone();
        }
        if self.tvdb.is_none() {
            self.tvdb = other.tvdb;
        }
        if self.slug.is_none() {
            self.slug = other.slug.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trakt.is_none()
            && self.tmdb.is_none()
            && self.imdb.is_none()
            && self.tvdb.is_none()
            && self.slug.is_none()
    }

    /// All present ids as prefixed strings, in identity preference order:
    /// activity-service id, catalog id, then external ids.
    pub fn prefixed(&self) -> Vec<String> {
        [
            self.trakt.map(|id| format!("trakt:{}", id)),
            self.tmdb.map(|id| format!("tmdb:{}", id)),
            self.imdb.as_ref().map(|id| format!("imdb:{}", id)),
            self.tvdb.map(|id| format!("tvdb:{}", id)),
            self.slug.as_ref().map(|slug| format!("slug:{}", slug)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The most preferred id, if any
    pub fn primary(&self) -> Option<String> {
        self.prefixed().into_iter().next()
    }
}

/// IMDB ids sometimes arrive with slashes from the activity service
pub fn clean_imdb_id(raw: &str) -> Option<String> {
    let cleaned = raw.replace('/', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
