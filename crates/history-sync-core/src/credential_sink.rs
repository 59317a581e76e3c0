use history_sync_config::{write_rotated_tokens, CredentialStore};
use history_sync_models::Credential;
use history_sync_sources::CredentialSink;
use std::path::PathBuf;
use tracing::info;

/// Persists refreshed tokens to the rotation file and, optionally, the
/// credential store
pub struct FileCredentialSink {
    rotated_tokens_path: PathBuf,
    store: Option<CredentialStore>,
}

impl FileCredentialSink {
    pub fn new(rotated_tokens_path: PathBuf) -> Self {
        Self {
            rotated_tokens_path,
            store: None,
        }
    }

    pub fn with_store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }
}

impl CredentialSink for FileCredentialSink {
    fn persist(&mut self, credential: &Credential) -> anyhow::Result<()> {
        write_rotated_tokens(&self.rotated_tokens_path, credential)?;
        if let Some(store) = self.store.as_mut() {
            store.set_trakt_credential(credential);
            store.save()?;
        }
        info!(path = ?self.rotated_tokens_path, "Wrote rotated tokens");
        Ok(())
    }
}
