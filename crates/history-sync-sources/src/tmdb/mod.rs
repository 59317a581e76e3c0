pub mod api;
pub mod client;

pub use api::{CatalogRequest, ExternalSource, ImageConfig, LookupShape};
pub use client::TmdbClient;
