//! Provider implementations for metadata search.

use async_trait::async_trait;

use crate::errors::MediaSearchError;
use crate::types::SearchResult;

pub mod demo;
pub mod omdb;

pub use demo::DemoProvider;
pub use omdb::OmdbProvider;

/// Source of title metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync + std::fmt::Debug {
    /// Searches titles by free-text query.
    ///
    /// An empty result is not an error.
    ///
    /// # Errors
    /// - `MediaSearchError::NotConfigured` - Provider lacks credentials
    /// - `MediaSearchError::NetworkError` - Provider unreachable
    /// - `MediaSearchError::ProviderError` - Provider reported an error
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}
