use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The service rejected the access token (HTTP 401)
    #[error("unauthorized")]
    Unauthorized,

    /// Refreshing the credential failed, or the refreshed token was rejected
    #[error("credentials expired: {0}")]
    AuthExpired(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, connection failures and 5xx responses
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("not found")]
    NotFound,

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("giving up after {attempts} attempts: {last}")]
    FetchFailed { attempts: u32, last: Box<SourceError> },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Classify a non-success status code
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => SourceError::Unauthorized,
            404 => SourceError::NotFound,
            429 => SourceError::RateLimited { retry_after },
            500..=599 => SourceError::Transient(format!("HTTP {}: {}", status, truncate(&body))),
            _ => SourceError::Http {
                status,
                body: truncate(&body),
            },
        }
    }

    /// Whether waiting and re-issuing the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_) | SourceError::RateLimited { .. })
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SourceError::AuthExpired(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::from_status(status.as_u16(), err.to_string(), None)
        } else {
            // timeouts, connect errors, broken bodies
            SourceError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
