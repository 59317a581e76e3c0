use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use history_sync_models::Credential;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{error, info, warn};
use crate::error::SourceError;
use crate::http::error_from_response;
use crate::traits::{CredentialSink, TokenEndpoint};

#[derive(Debug, Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    /// Unix seconds
    #[serde(default)]
    created_at: Option<i64>,
}

/// `POST /oauth/token` with the refresh-token grant
pub struct TraktTokenEndpoint {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TraktTokenEndpoint {
    pub fn new(client: Client, token_url: String, client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl TokenEndpoint for TraktTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, SourceError> {
        let payload = serde_json::json!({
            "refresh_token": refresh_token,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "redirect_uri": self.redirect_uri,
            "grant_type": "refresh_token"
        });

        let response = self
            .client
            .post(&self.token_url)
            .json(&payload)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let token_response: TokenResponse = response.json().await?;
        let issued_at = token_response
            .created_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Credential {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            issued_at,
        })
    }
}

/// Owns the current token pair for one run.
///
/// Every authenticated call goes through [`CredentialManager::authorize`]: a
/// 401 triggers exactly one refresh, the new pair is persisted through the
/// sink, and the original call is repeated once. A failed refresh or a
/// second 401 ends in [`SourceError::AuthExpired`].
pub struct CredentialManager {
    credential: Credential,
    endpoint: Box<dyn TokenEndpoint>,
    sink: Box<dyn CredentialSink>,
    refreshes: u32,
}

impl CredentialManager {
    pub fn new(credential: Credential, endpoint: Box<dyn TokenEndpoint>, sink: Box<dyn CredentialSink>) -> Self {
        Self {
            credential,
            endpoint,
            sink,
            refreshes: 0,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Refreshes performed so far in this run
    pub fn refresh_count(&self) -> u32 {
        self.refreshes
    }

    /// Run `call` with the current access token, refreshing once on 401
    pub async fn authorize<F, Fut, T>(&mut self, mut call: F) -> Result<T, SourceError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        match call(self.credential.access_token.clone()).await {
            Err(SourceError::Unauthorized) => {
                warn!("Access token rejected, refreshing");
                self.refresh().await?;
                match call(self.credential.access_token.clone()).await {
                    Err(SourceError::Unauthorized) => Err(SourceError::AuthExpired(
                        "refreshed token was rejected".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn refresh(&mut self) -> Result<(), SourceError> {
        let refreshed = self
            .endpoint
            .refresh(&self.credential.refresh_token)
            .await
            .map_err(|e| SourceError::AuthExpired(format!("token refresh failed: {}", e)))?;

        self.credential = refreshed;
        self.refreshes += 1;
        info!(issued_at = %self.credential.issued_at, "Access token refreshed");

        // The in-memory pair keeps this run going even if persisting fails.
        if let Err(e) = self.sink.persist(&self.credential) {
            error!("Failed to persist refreshed credentials: {}", e);
        }
        Ok(())
    }
}
