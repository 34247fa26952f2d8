//! Content acquisition behind a single capability contract.
//!
//! The stream pipeline never speaks a swarm protocol. It hands a descriptor to
//! a [`ContentSource`], waits for metadata, picks a payload and reads it
//! sequentially. Which backend answers those calls is chosen at startup from
//! the runtime mode.

pub mod library;
pub mod magnet;
#[cfg(any(test, feature = "test-utils"))]
pub mod simulation;
pub mod web_seed;

use std::sync::Arc;

use async_trait::async_trait;
pub use library::LibrarySource;
pub use magnet::{InfoHash, MagnetLink};
use serde::{Deserialize, Serialize};
#[cfg(any(test, feature = "test-utils"))]
pub use simulation::SimulatedContentSource;
use tokio::io::AsyncRead;
use uuid::Uuid;
pub use web_seed::WebSeedSource;

use crate::config::UndertowConfig;
use crate::mode::RuntimeMode;

/// Sequential byte reader over one payload.
pub type PayloadReader = Box<dyn AsyncRead + Send + Unpin>;

/// Candidate payload exposed by a resolved source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadInfo {
    /// Name relative to the resource root
    pub name: String,
    /// Size in bytes
    pub length: u64,
}

impl PayloadInfo {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Accepted resource, returned by [`ContentSource::accept`].
///
/// Every accept yields a distinct handle, even for the same magnet, so
/// per-stream backend state never leaks between streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    pub magnet: MagnetLink,
    key: Uuid,
}

impl SourceHandle {
    pub fn new(magnet: MagnetLink) -> Self {
        Self {
            magnet,
            key: Uuid::new_v4(),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.magnet.info_hash
    }

    /// Identifies this particular accept.
    pub fn key(&self) -> Uuid {
        self.key
    }
}

/// Errors from content sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Source rejected descriptor: {reason}")]
    Rejected { reason: String },

    #[error("Metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    #[error("No payloads found")]
    NoPayloads,

    #[error("Payload '{name}' not found")]
    PayloadNotFound { name: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability the pipeline consumes to acquire content.
///
/// Implementations must be cheap to share: the orchestrator holds one behind
/// an `Arc` and calls it from every pipeline task concurrently.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Validates the descriptor and registers it with the backend.
    ///
    /// # Errors
    /// - `SourceError::InvalidDescriptor` - Descriptor is not a usable magnet link
    /// - `SourceError::Rejected` - Backend refuses the resource
    async fn accept(&self, descriptor: &str) -> Result<SourceHandle, SourceError>;

    /// Blocks until payload metadata is known.
    ///
    /// May wait indefinitely; callers bound it with their own cancellation.
    ///
    /// # Errors
    /// - `SourceError::MetadataUnavailable` - Backend gave up resolving the resource
    async fn await_metadata(&self, handle: &SourceHandle) -> Result<(), SourceError>;

    /// Lists candidate payloads of a resolved resource.
    async fn list_payloads(&self, handle: &SourceHandle) -> Result<Vec<PayloadInfo>, SourceError>;

    /// Opens a sequential reader over one payload.
    ///
    /// # Errors
    /// - `SourceError::PayloadNotFound` - Name is not one of the listed payloads
    async fn open_reader(
        &self,
        handle: &SourceHandle,
        payload: &PayloadInfo,
    ) -> Result<PayloadReader, SourceError>;

    /// Drops any backend state held for the resource.
    async fn release(&self, handle: &SourceHandle);

    /// Short backend name for logs.
    fn source_type(&self) -> &'static str;
}

/// Builds the content source for the given runtime mode.
///
/// # Errors
/// - `SourceError::Http` - HTTP client could not be built
pub fn source_for_mode(
    mode: RuntimeMode,
    config: &UndertowConfig,
) -> Result<Arc<dyn ContentSource>, SourceError> {
    match mode {
        RuntimeMode::Production => Ok(Arc::new(WebSeedSource::new(config.source.http_timeout)?)),
        RuntimeMode::Development => Ok(Arc::new(LibrarySource::new(
            config.source.library_dir.clone(),
            config.source.metadata_poll_interval,
        ))),
    }
}

/// Picks the payload to transcode: the largest one, first wins on ties.
pub fn select_main_payload(payloads: &[PayloadInfo]) -> Option<&PayloadInfo> {
    let mut selected: Option<&PayloadInfo> = None;
    for payload in payloads {
        if selected.is_none_or(|current| payload.length > current.length) {
            selected = Some(payload);
        }
    }
    selected
}
