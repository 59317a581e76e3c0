use async_trait::async_trait;
use history_sync_config::{HttpConfig, TraktConfig};
use reqwest::Client;
use crate::error::SourceError;
use crate::http::create_http_client;
use crate::traits::HistoryApi;
use crate::trakt::api::{self, HistoryPage, HistoryQuery, UserProfile};
use crate::trakt::auth::TraktTokenEndpoint;

#[derive(Clone)]
pub struct TraktClient {
    client: Client,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TraktClient {
    pub fn from_config(trakt: &TraktConfig, http: &HttpConfig) -> Result<Self, SourceError> {
        if trakt.client_id.trim().is_empty() {
            return Err(SourceError::Config("trakt.client_id is not set".to_string()));
        }
        Ok(Self {
            client: create_http_client(http)?,
            api_base_url: trakt.api_base_url.trim_end_matches('/').to_string(),
            client_id: trakt.client_id.clone(),
            client_secret: trakt.client_secret.clone(),
            redirect_uri: trakt.redirect_uri.clone(),
        })
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Token endpoint sharing this client's connection pool
    pub fn token_endpoint(&self) -> TraktTokenEndpoint {
        TraktTokenEndpoint::new(
            self.client.clone(),
            format!("{}/oauth/token", self.api_base_url),
            self.client_id.clone(),
            self.client_secret.clone(),
            self.redirect_uri.clone(),
        )
    }
}

#[async_trait]
impl HistoryApi for TraktClient {
    async fn history_page(&self, access_token: &str, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        api::get_history_page(&self.client, &self.api_base_url, &self.client_id, access_token, query).await
    }

    async fn current_user(&self, access_token: &str) -> Result<UserProfile, SourceError> {
        api::get_current_user(&self.client, &self.api_base_url, &self.client_id, access_token).await
    }
}
