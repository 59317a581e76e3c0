use chrono::{DateTime, SecondsFormat, Utc};
use history_sync_models::{clean_imdb_id, PrimaryIds};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::error::SourceError;
use crate::http::error_from_response;

pub const API_VERSION: &str = "2";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraktIds {
    #[serde(default)]
    pub trakt: Option<u64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub imdb: Option<String>,
    #[serde(default)]
    pub tmdb: Option<u32>,
    #[serde(default)]
    pub tvdb: Option<u32>,
}

impl TraktIds {
    /// Convert to model ids; IMDb ids come back with stray slashes at times
    pub fn to_primary_ids(&self) -> PrimaryIds {
        PrimaryIds {
            trakt: self.trakt,
            tmdb: self.tmdb,
            imdb: self.imdb.as_deref().and_then(clean_imdb_id),
            tvdb: self.tvdb,
            slug: self.slug.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMovie {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: TraktIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawShow {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: TraktIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEpisode {
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ids: TraktIds,
}

/// One history entry exactly as the service reports it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHistoryItem {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub watched_at: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub movie: Option<RawMovie>,
    #[serde(default)]
    pub show: Option<RawShow>,
    #[serde(default)]
    pub episode: Option<RawEpisode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub start_at: Option<DateTime<Utc>>,
    /// Upper bound, used to page into an older window left by a truncated run
    pub end_at: Option<DateTime<Utc>>,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl HistoryQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(end_at) = self.end_at {
            params.insert(0, ("end_at", end_at.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(start_at) = self.start_at {
            params.insert(0, ("start_at", start_at.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        params
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub items: Vec<RawHistoryItem>,
    /// From `X-Pagination-Page-Count`, when present
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Standard header set for authenticated calls
fn authorized(request: RequestBuilder, access_token: &str, client_id: &str) -> RequestBuilder {
    request
        .header("Authorization", format!("Bearer {}", access_token))
        .header("trakt-api-version", API_VERSION)
        .header("trakt-api-key", client_id)
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
}

/// Fetch one page of the user's watch history
pub async fn get_history_page(
    client: &Client,
    base_url: &str,
    client_id: &str,
    access_token: &str,
    query: &HistoryQuery,
) -> Result<HistoryPage, SourceError> {
    let url = format!("{}/sync/history", base_url.trim_end_matches('/'));
    let response = authorized(client.get(&url), access_token, client_id)
        .query(&query.params())
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let page_count: Option<u32> = response
        .headers()
        .get("X-Pagination-Page-Count")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse().ok());

    let body: Vec<Value> = response.json().await?;
    let items = decode_items(body);

    debug!(
        page = query.page,
        items = items.len(),
        page_count = ?page_count,
        "Fetched history page"
    );

    Ok(HistoryPage { items, page_count })
}

/// Decode entries one by one so a single odd entry does not sink the page
pub fn decode_items(body: Vec<Value>) -> Vec<RawHistoryItem> {
    body.into_iter()
        .filter_map(|value| match serde_json::from_value::<RawHistoryItem>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping undecodable history entry: {}", e);
                None
            }
        })
        .collect()
}

pub async fn get_current_user(
    client: &Client,
    base_url: &str,
    client_id: &str,
    access_token: &str,
) -> Result<UserProfile, SourceError> {
    let url = format!("{}/users/me", base_url.trim_end_matches('/'));
    let response = authorized(client.get(&url), access_token, client_id).send().await?;

    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_query_params() {
        let query = HistoryQuery {
            start_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            end_at: None,
            page: 2,
            limit: 200,
        };
        assert_eq!(
            query.params(),
            vec![
                ("start_at", "2024-01-02T03:04:05.000Z".to_string()),
                ("page", "2".to_string()),
                ("limit", "200".to_string()),
            ]
        );

        let unbounded = HistoryQuery { start_at: None, end_at: None, page: 1, limit: 10 };
        assert_eq!(unbounded.params().len(), 2);

        let window = HistoryQuery {
            start_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            page: 1,
            limit: 10,
        };
        assert_eq!(
            window.params()[..2],
            [
                ("start_at", "2024-01-01T00:00:00.000Z".to_string()),
                ("end_at", "2024-01-02T00:00:00.000Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_items_skips_bad_entries() {
        let body = vec![
            json!({
                "id": 9001,
                "watched_at": "2024-01-01T20:00:00.000Z",
                "action": "watch",
                "type": "episode",
                "show": {"title": "Dark", "year": 2017, "ids": {"trakt": 1, "tmdb": 70523}},
                "episode": {"season": 1, "number": 2, "title": "Lies", "ids": {"trakt": 77}}
            }),
            json!({"id": "not-a-number"}),
        ];
        let items = decode_items(body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, Some(9001));
        assert_eq!(items[0].episode.as_ref().unwrap().number, Some(2));
    }

    #[test]
    fn test_ids_are_cleaned() {
        let ids = TraktIds {
            imdb: Some("/tt0113277/".to_string()),
            slug: Some(String::new()),
            trakt: Some(5),
            ..TraktIds::default()
        };
        let primary = ids.to_primary_ids();
        assert_eq!(primary.imdb.as_deref(), Some("tt0113277"));
        assert_eq!(primary.slug, None);
        assert_eq!(primary.trakt, Some(5));
    }
}
