//! Media search service used by the HTTP layer.

use std::sync::Arc;

use undertow_core::RuntimeMode;
use undertow_core::config::SearchConfig;

use crate::errors::MediaSearchError;
use crate::providers::{DemoProvider, MetadataProvider, OmdbProvider};
use crate::types::SearchResult;

/// Cheaply cloneable handle to the configured metadata provider.
#[derive(Debug, Clone)]
pub struct MediaSearchService {
    provider: Arc<dyn MetadataProvider>,
}

impl MediaSearchService {
    /// Picks the provider for the runtime mode.
    ///
    /// # Errors
    /// - `MediaSearchError::NotConfigured` - OMDb settings are unusable
    /// - `MediaSearchError::NetworkError` - HTTP client could not be built
    pub fn from_runtime_mode(
        mode: RuntimeMode,
        config: &SearchConfig,
    ) -> Result<Self, MediaSearchError> {
        let provider: Arc<dyn MetadataProvider> = match mode {
            RuntimeMode::Production => Arc::new(OmdbProvider::new(config)?),
            RuntimeMode::Development => Arc::new(DemoProvider::new()),
        };
        tracing::info!("Media search using {} provider", provider.name());
        Ok(Self { provider })
    }

    /// Wraps an explicit provider.
    pub fn with_provider(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    /// Searches titles matching `query`.
    ///
    /// # Errors
    /// - `MediaSearchError` - Whatever the provider reports
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError> {
        tracing::info!("Received search query: {}", query);
        self.provider.search(query).await
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}
