//! Stream lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a stream.
///
/// Streams only move forward along
/// `Initializing → GettingInfo → Downloading → Transcoding → Ready`;
/// `Error` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Record created, descriptor not yet accepted
    Initializing,
    /// Waiting for payload metadata
    GettingInfo,
    /// Payload selected, storage being prepared
    Downloading,
    /// Transcoder running, segments appear progressively
    Transcoding,
    /// Transcoder exited successfully
    Ready,
    /// Pipeline stopped on a failure
    Error,
}

impl StreamState {
    /// Check if no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Ready | StreamState::Error)
    }

    /// Next state on the success path, if any
    pub fn next(self) -> Option<StreamState> {
        match self {
            StreamState::Initializing => Some(StreamState::GettingInfo),
            StreamState::GettingInfo => Some(StreamState::Downloading),
            StreamState::Downloading => Some(StreamState::Transcoding),
            StreamState::Transcoding => Some(StreamState::Ready),
            StreamState::Ready | StreamState::Error => None,
        }
    }

    /// Check if moving from `self` to `target` is allowed
    pub fn can_transition_to(self, target: StreamState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == StreamState::Error || self.next() == Some(target)
    }

    /// Check if segment files may already be served
    pub fn serves_segments(self) -> bool {
        matches!(self, StreamState::Transcoding | StreamState::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Initializing => "initializing",
            StreamState::GettingInfo => "getting_info",
            StreamState::Downloading => "downloading",
            StreamState::Transcoding => "transcoding",
            StreamState::Ready => "ready",
            StreamState::Error => "error",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
