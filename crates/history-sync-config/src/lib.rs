pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, HttpConfig, PathOverrides, RetryConfig, SyncOptions, TmdbConfig, TokenOverride, TraktConfig};
pub use credentials::{write_rotated_tokens, CredentialStore};
pub use paths::{env_base_path, PathManager};
