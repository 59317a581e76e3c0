use async_trait::async_trait;
use history_sync_models::Credential;
use serde_json::Value;
use crate::error::SourceError;
use crate::tmdb::api::CatalogRequest;
use crate::trakt::api::{HistoryPage, HistoryQuery, UserProfile};

/// Read access to the activity service
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// One page of `/sync/history`
    async fn history_page(&self, access_token: &str, query: &HistoryQuery) -> Result<HistoryPage, SourceError>;

    /// `/users/me`, used to verify the session before a run
    async fn current_user(&self, access_token: &str) -> Result<UserProfile, SourceError>;
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, SourceError>;
}

/// Receives every refreshed credential so it outlives the run
pub trait CredentialSink: Send {
    fn persist(&mut self, credential: &Credential) -> anyhow::Result<()>;
}

/// Read-only metadata catalog
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Raw JSON body, or `None` when the catalog has no such entry
    async fn get(&self, request: &CatalogRequest) -> Result<Option<Value>, SourceError>;
}
