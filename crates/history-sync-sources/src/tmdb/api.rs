use serde_json::Value;
use std::fmt;

/// External id namespaces accepted by `/find`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalSource {
    Imdb,
    Tvdb,
}

impl ExternalSource {
    pub fn as_param(&self) -> &'static str {
        match self {
            ExternalSource::Imdb => "imdb_id",
            ExternalSource::Tvdb => "tvdb_id",
        }
    }
}

/// Which memo map a request is cached in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupShape {
    ById,
    ByExternalId,
    BySearch,
}

impl fmt::Display for LookupShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupShape::ById => write!(f, "id"),
            LookupShape::ByExternalId => write!(f, "external_id"),
            LookupShape::BySearch => write!(f, "search"),
        }
    }
}

/// Every catalog call the enricher makes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogRequest {
    Movie { id: u32, language: Option<String> },
    Show { id: u32, language: Option<String> },
    Season { show_id: u32, season: u32, language: Option<String> },
    Episode { show_id: u32, season: u32, episode: u32, language: Option<String> },
    ShowExternalIds { show_id: u32 },
    FindByExternalId { external_id: String, source: ExternalSource },
    SearchMovie { query: String, year: Option<u32>, language: Option<String> },
    SearchShow { query: String, year: Option<u32>, language: Option<String> },
    Configuration,
}

impl CatalogRequest {
    pub fn path(&self) -> String {
        match self {
            CatalogRequest::Movie { id, .. } => format!("/movie/{}", id),
            CatalogRequest::Show { id, .. } => format!("/tv/{}", id),
            CatalogRequest::Season { show_id, season, .. } => format!("/tv/{}/season/{}", show_id, season),
            CatalogRequest::Episode { show_id, season, episode, .. } => {
                format!("/tv/{}/season/{}/episode/{}", show_id, season, episode)
            }
            CatalogRequest::ShowExternalIds { show_id } => format!("/tv/{}/external_ids", show_id),
            CatalogRequest::FindByExternalId { external_id, .. } => format!("/find/{}", external_id),
            CatalogRequest::SearchMovie { .. } => "/search/movie".to_string(),
            CatalogRequest::SearchShow { .. } => "/search/tv".to_string(),
            CatalogRequest::Configuration => "/configuration".to_string(),
        }
    }

    /// Query parameters other than the API key
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        match self {
            CatalogRequest::FindByExternalId { source, .. } => {
                params.push(("external_source", source.as_param().to_string()));
            }
            CatalogRequest::SearchMovie { query, year, .. } => {
                params.push(("query", query.clone()));
                if let Some(year) = year {
                    params.push(("year", year.to_string()));
                }
            }
            CatalogRequest::SearchShow { query, year, .. } => {
                params.push(("query", query.clone()));
                if let Some(year) = year {
                    params.push(("first_air_date_year", year.to_string()));
                }
            }
            _ => {}
        }
        if let Some(language) = self.language() {
            params.push(("language", language.to_string()));
        }
        params
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            CatalogRequest::Movie { language, .. }
            | CatalogRequest::Show { language, .. }
            | CatalogRequest::Season { language, .. }
            | CatalogRequest::Episode { language, .. }
            | CatalogRequest::SearchMovie { language, .. }
            | CatalogRequest::SearchShow { language, .. } => language.as_deref(),
            _ => None,
        }
    }

    pub fn shape(&self) -> LookupShape {
        match self {
            CatalogRequest::FindByExternalId { .. } => LookupShape::ByExternalId,
            CatalogRequest::SearchMovie { .. } | CatalogRequest::SearchShow { .. } => LookupShape::BySearch,
            _ => LookupShape::ById,
        }
    }

    /// Language-independent key within the request's shape
    pub fn cache_key(&self) -> String {
        match self {
            CatalogRequest::FindByExternalId { external_id, source } => {
                format!("{}:{}", source.as_param(), external_id)
            }
            CatalogRequest::SearchMovie { query, year, .. } => search_key("movie", query, *year),
            CatalogRequest::SearchShow { query, year, .. } => search_key("tv", query, *year),
            _ => self.path(),
        }
    }
}

fn search_key(kind: &str, query: &str, year: Option<u32>) -> String {
    match year {
        Some(year) => format!("{}:{}:{}", kind, query.trim().to_lowercase(), year),
        None => format!("{}:{}", kind, query.trim().to_lowercase()),
    }
}

/// Id of the first entry in `body[field]`, e.g. `movie_results` of `/find`
/// or `results` of a search
pub fn first_result_id(body: &Value, field: &str) -> Option<u32> {
    body.get(field)?
        .as_array()?
        .first()?
        .get("id")?
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
}

/// Non-empty string field
pub fn str_field(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Positive integer field
pub fn u32_field(body: &Value, field: &str) -> Option<u32> {
    body.get(field)
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

/// Image URL layout: `base + size + path`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageConfig {
    pub base_url: String,
    pub poster_size: String,
    pub backdrop_size: String,
    pub still_size: String,
}

impl ImageConfig {
    pub fn url(&self, size: &str, path: Option<&str>) -> Option<String> {
        let path = path.map(str::trim).filter(|p| !p.is_empty())?;
        Some(format!("{}{}{}", self.base_url, size, path))
    }

    pub fn poster_url(&self, path: Option<&str>) -> Option<String> {
        self.url(&self.poster_size, path)
    }

    pub fn backdrop_url(&self, path: Option<&str>) -> Option<String> {
        self.url(&self.backdrop_size, path)
    }

    pub fn still_url(&self, path: Option<&str>) -> Option<String> {
        self.url(&self.still_size, path)
    }

    /// Apply a `/configuration` body: secure base URL, and each preferred
    /// size if listed, else the largest listed size
    pub fn with_discovered(&self, body: &Value) -> Self {
        let images = match body.get("images") {
            Some(images) => images,
            None => return self.clone(),
        };
        let pick = |field: &str, preferred: &str| -> String {
            let sizes: Vec<&str> = images
                .get(field)
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if sizes.is_empty() || sizes.contains(&preferred) {
                preferred.to_string()
            } else {
                sizes[sizes.len() - 1].to_string()
            }
        };
        Self {
            base_url: str_field(images, "secure_base_url").unwrap_or_else(|| self.base_url.clone()),
            poster_size: pick("poster_sizes", &self.poster_size),
            backdrop_size: pick("backdrop_sizes", &self.backdrop_size),
            still_size: pick("still_sizes", &self.still_size),
        }
    }
}
