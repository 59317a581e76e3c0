pub mod sync;
pub mod diff;
pub mod normalize;
pub mod enrich;
pub mod event_log;
pub mod cursor;
pub mod credential_sink;
pub mod catalog_cache;
pub mod catalog_cache_storage;

pub use diff::{reconcile, IdentityIndex};
pub use normalize::{normalize, normalize_batch};

pub use sync::{RunOptions, SyncError, SyncOrchestrator, SyncPhase, SyncReport};
pub use enrich::CatalogEnricher;
pub use event_log::EventLog;
pub use cursor::{Backfill, CursorStore};
pub use credential_sink::FileCredentialSink;
pub use catalog_cache::{CacheStats, CachedLookup, CatalogCache};
pub use catalog_cache_storage::CatalogCacheStorage;
