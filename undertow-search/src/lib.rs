//! Undertow Search - media metadata lookup behind `/search`
//!
//! Production mode asks the OMDb API; development mode answers from a small
//! built-in catalogue so the UI works without an API key.

pub mod errors;
pub mod providers;
pub mod service;
pub mod types;

pub use errors::MediaSearchError;
pub use providers::{DemoProvider, MetadataProvider, OmdbProvider};
pub use service::MediaSearchService;
pub use types::SearchResult;

/// Convenience type alias for Results with MediaSearchError.
pub type Result<T> = std::result::Result<T, MediaSearchError>;
