use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access/refresh token pair for the activity service
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            issued_at: Utc::now(),
        }
    }

    /// The pair written out for external secret rotation
    pub fn rotated(&self) -> RotatedTokens {
        RotatedTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotatedTokens {
    pub access_token: String,
    pub refresh_token: String,
}
