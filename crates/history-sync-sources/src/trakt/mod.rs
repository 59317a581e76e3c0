pub mod api;
pub mod auth;
pub mod client;
pub mod history;

pub use auth::{CredentialManager, TraktTokenEndpoint};
pub use client::TraktClient;
pub use history::{HistoryFetcher, HistoryPages};
