use anyhow::Result;
use chrono::{DateTime, Utc};
use history_sync_models::Credential;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::config::TokenOverride;

const ACCESS_TOKEN_KEY: &str = "trakt_access_token";
const REFRESH_TOKEN_KEY: &str = "trakt_refresh_token";
const ISSUED_AT_KEY: &str = "trakt_token_issued_at";

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

/// Key/value TOML store for activity-service tokens
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn clear(&mut self) {
        self.credentials.clear();
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }

    pub fn get_trakt_access_token(&self) -> Option<&String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn get_trakt_refresh_token(&self) -> Option<&String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    pub fn get_trakt_token_issued_at(&self) -> Option<DateTime<Utc>> {
        self.get(ISSUED_AT_KEY)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Current credential, environment tokens taking precedence.
    ///
    /// A refresh token is mandatory; the access token may be empty, in
    /// which case the first request is rejected and triggers a refresh.
    pub fn trakt_credential(&self, env: &TokenOverride) -> Option<Credential> {
        let refresh_token = env
            .refresh_token
            .clone()
            .or_else(|| self.get_trakt_refresh_token().cloned())?;
        let access_token = env
            .access_token
            .clone()
            .or_else(|| self.get_trakt_access_token().cloned())
            .unwrap_or_default();
        let issued_at = self.get_trakt_token_issued_at().unwrap_or_else(Utc::now);
        Some(Credential {
            access_token,
            refresh_token,
            issued_at,
        })
    }

    pub fn set_trakt_credential(&mut self, credential: &Credential) {
        self.set(ACCESS_TOKEN_KEY.to_string(), credential.access_token.clone());
        self.set(REFRESH_TOKEN_KEY.to_string(), credential.refresh_token.clone());
        self.set(ISSUED_AT_KEY.to_string(), credential.issued_at.to_rfc3339());
    }
}

/// Write `{access_token, refresh_token}` for an external secret rotation job
pub fn write_rotated_tokens(path: &Path, credential: &Credential) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&credential.rotated())?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
