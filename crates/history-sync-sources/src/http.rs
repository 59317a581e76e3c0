use crate::error::SourceError;
use history_sync_config::HttpConfig;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use std::time::Duration;

/// Shared reqwest client with the configured timeout and user agent
pub fn create_http_client(config: &HttpConfig) -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {}", e)))
}

/// `Retry-After` in its delta-seconds form
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Turn a non-success response into a classified error
pub async fn error_from_response(response: Response) -> SourceError {
    let status = response.status().as_u16();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    SourceError::from_status(status, body, retry_after)
}
