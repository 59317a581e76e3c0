pub mod credential;
pub mod enrichment;
pub mod identity;
pub mod primary_ids;
pub mod watch_event;
pub mod watermark;

pub use credential::{Credential, RotatedTokens};
pub use enrichment::{EpisodeEnrichment, MovieEnrichment};
pub use identity::IdentityKey;
pub use primary_ids::{clean_imdb_id, PrimaryIds};
pub use watch_event::{sort_newest_first, EpisodeWatch, MovieWatch, WatchEvent};
pub use watermark::Watermark;
