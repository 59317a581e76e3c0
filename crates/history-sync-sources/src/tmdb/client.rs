use async_trait::async_trait;
use history_sync_config::{HttpConfig, TmdbConfig};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use crate::error::SourceError;
use crate::http::{create_http_client, error_from_response};
use crate::tmdb::api::CatalogRequest;
use crate::traits::CatalogApi;

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn from_config(tmdb: &TmdbConfig, http: &HttpConfig) -> Result<Self, SourceError> {
        if tmdb.api_key.trim().is_empty() {
            return Err(SourceError::Config("tmdb.api_key is not set".to_string()));
        }
        Ok(Self {
            client: create_http_client(http)?,
            api_base_url: tmdb.api_base_url.trim_end_matches('/').to_string(),
            api_key: tmdb.api_key.clone(),
        })
    }

    pub fn url(&self, request: &CatalogRequest) -> String {
        format!("{}{}", self.api_base_url, request.path())
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn get(&self, request: &CatalogRequest) -> Result<Option<Value>, SourceError> {
        let mut params = request.params();
        params.push(("api_key", self.api_key.clone()));

        let response = self
            .client
            .get(self.url(request))
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = %request.path(), "Catalog has no entry");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(Some(response.json().await?))
    }
}
