//! Undertow Core - magnet to HLS stream orchestration
//!
//! This crate turns a magnet descriptor into a progressively playable HLS
//! presentation: a content source resolves and reads the payload, an external
//! transcoder segments it into a private working directory, and the stream
//! orchestrator tracks every stream's lifecycle behind a single registry.

pub mod config;
pub mod mode;
pub mod source;
pub mod streams;
pub mod tracing_setup;
pub mod transcoding;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use mode::RuntimeMode;
pub use source::{
    ContentSource, InfoHash, MagnetLink, PayloadInfo, SourceError, SourceHandle, source_for_mode,
};
pub use streams::{
    OrchestratorError, PipelineError, RegistryError, SegmentError, StreamId, StreamOrchestrator,
    StreamRecord, StreamRegistry, StreamState,
};
pub use transcoding::{FfmpegTranscoder, TranscodeError, TranscodeOutcome, Transcoder};

/// Core errors that can bubble up from any Undertow subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Content source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transcoding error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Stream error: {0}")]
    Stream(#[from] OrchestratorError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Source(e) => match e {
                SourceError::InvalidDescriptor { reason } => {
                    format!("Invalid magnet link: {reason}")
                }
                SourceError::Rejected { reason } => format!("Source rejected the link: {reason}"),
                SourceError::NoPayloads => "The torrent contains no files".to_string(),
                _ => "Content acquisition failed".to_string(),
            },
            UndertowError::Transcode(_) => "Transcoding failed".to_string(),
            UndertowError::Stream(OrchestratorError::StreamNotFound { id }) => {
                format!("Stream {id} not found")
            }
            UndertowError::Stream(_) => "Stream setup failed".to_string(),
            UndertowError::Configuration { .. } => "Configuration error occurred".to_string(),
            UndertowError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Configuration { .. }
                | UndertowError::Source(SourceError::InvalidDescriptor { .. })
                | UndertowError::Stream(OrchestratorError::Source(
                    SourceError::InvalidDescriptor { .. }
                ))
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_descriptor_is_user_error() {
        let error = UndertowError::from(SourceError::InvalidDescriptor {
            reason: "missing xt".to_string(),
        });
        assert!(error.is_user_error());
        assert_eq!(error.user_message(), "Invalid magnet link: missing xt");
    }

    #[test]
    fn test_io_error_is_not_user_error() {
        let error = UndertowError::from(std::io::Error::other("disk full"));
        assert!(!error.is_user_error());
        assert_eq!(error.user_message(), "File system error occurred");
    }
}
