//! Error types for media search functionality.

use thiserror::Error;

/// Errors that can occur during media search operations.
#[derive(Debug, Error)]
pub enum MediaSearchError {
    /// Search operation failed with the specified query and reason.
    #[error("Search failed for query '{query}': {reason}")]
    SearchFailed {
        /// The search query that failed
        query: String,
        /// The reason for the failure
        reason: String,
    },

    /// Network communication error occurred during search.
    #[error("Network error: {reason}")]
    NetworkError {
        /// The reason for the network error
        reason: String,
    },

    /// Failed to parse search results or response data.
    #[error("Parse error: {reason}")]
    ParseError {
        /// The reason for the parse error
        reason: String,
    },

    /// Search provider returned an error.
    #[error("Provider error: {reason}")]
    ProviderError {
        /// The reason for the provider error
        reason: String,
    },

    /// Provider is missing required configuration such as an API key.
    #[error("Provider not configured: {reason}")]
    NotConfigured {
        /// What is missing
        reason: String,
    },
}

impl From<reqwest::Error> for MediaSearchError {
    fn from(error: reqwest::Error) -> Self {
        MediaSearchError::NetworkError {
            reason: error.to_string(),
        }
    }
}
