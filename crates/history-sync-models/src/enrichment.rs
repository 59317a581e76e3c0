use serde::{Deserialize, Serialize};

/// Catalog-derived display fields for a movie watch, populated best-effort
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MovieEnrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_url: Option<String>,
    /// Minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u32>,
}

impl MovieEnrichment {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Catalog-derived display fields for an episode watch, populated best-effort
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EpisodeEnrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_title_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_poster_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_backdrop_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_total_episodes: Option<u32>,
    /// Average episode length of the show in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_episode_run_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_total_episodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_overview_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_still_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_runtime: Option<u32>,
}

impl EpisodeEnrichment {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
