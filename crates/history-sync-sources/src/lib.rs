pub mod error;
pub mod http;
pub mod progress;
pub mod retry;
pub mod tmdb;
pub mod traits;
pub mod trakt;

pub use error::SourceError;
pub use progress::ProgressTracker;
pub use retry::RetryPolicy;
pub use tmdb::{CatalogRequest, ExternalSource, ImageConfig, LookupShape, TmdbClient};
pub use traits::{CatalogApi, CredentialSink, HistoryApi, TokenEndpoint};
pub use trakt::api::{HistoryPage, HistoryQuery, RawEpisode, RawHistoryItem, RawMovie, RawShow, TraktIds, UserProfile};
pub use trakt::{CredentialManager, HistoryFetcher, HistoryPages, TraktClient, TraktTokenEndpoint};
