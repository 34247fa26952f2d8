//! Stream records and pipeline failure details

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::StreamState;
use crate::source::{PayloadInfo, SourceError};
use crate::transcoding::TranscodeError;

/// Opaque stream identifier used in URLs and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for StreamId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Why a pipeline stopped. Stored on the record for later queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Acquisition failed: {reason}")]
    Acquisition { reason: String },

    #[error("No payloads found")]
    NoPayloads,

    #[error("Storage allocation failed: {reason}")]
    Storage { reason: String },

    #[error("Transcoder failed: {reason}")]
    Transcoder {
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Cancelled while {stage}")]
    Cancelled { stage: StreamState },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl PipelineError {
    /// Short machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Acquisition { .. } => "acquisition",
            PipelineError::NoPayloads => "no_payloads",
            PipelineError::Storage { .. } => "storage",
            PipelineError::Transcoder { .. } => "transcoder",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Internal { .. } => "internal",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }

    /// Maps a transcoder error, attributing cancellation to the transcoding stage.
    pub fn from_transcode(error: TranscodeError) -> Self {
        match error {
            TranscodeError::Cancelled => PipelineError::Cancelled {
                stage: StreamState::Transcoding,
            },
            TranscodeError::InputFailed { reason } => PipelineError::Acquisition { reason },
            TranscodeError::ExitFailure { exit_code, reason } => {
                PipelineError::Transcoder { exit_code, reason }
            }
            error @ TranscodeError::SpawnFailed { .. } => PipelineError::Transcoder {
                exit_code: None,
                reason: error.to_string(),
            },
            TranscodeError::Io(e) => PipelineError::Storage {
                reason: e.to_string(),
            },
        }
    }
}

impl From<SourceError> for PipelineError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::NoPayloads => PipelineError::NoPayloads,
            other => PipelineError::Acquisition {
                reason: other.to_string(),
            },
        }
    }
}

/// Snapshot of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub id: StreamId,
    /// Descriptor as submitted
    pub descriptor: String,
    pub state: StreamState,
    /// Set once when storage is allocated
    pub working_dir: Option<PathBuf>,
    /// Set once when a payload is selected
    pub payload: Option<PayloadInfo>,
    /// Failure detail, kept after the stream reaches `Error`
    pub last_error: Option<PipelineError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamRecord {
    pub(crate) fn new(descriptor: String) -> Self {
        let now = Utc::now();
        Self {
            id: StreamId::new(),
            descriptor,
            state: StreamState::Initializing,
            working_dir: None,
            payload: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Directory the segment server may read from, once transcoding has started
    /// and unless the stream failed.
    pub fn servable_dir(&self) -> Option<&PathBuf> {
        if !self.state.serves_segments() {
            return None;
        }
        self.working_dir.as_ref()
    }
}
