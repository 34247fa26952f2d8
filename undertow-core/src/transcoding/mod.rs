//! Transcoding of payload bytes into segmented HLS output
//!
//! The pipeline treats the transcoder as a black box: bytes go in, a playlist
//! and numbered segments appear in a directory, and the exit status decides
//! success.

pub mod ffmpeg;
#[cfg(any(test, feature = "test-utils"))]
pub mod simulation;

use std::path::Path;

use async_trait::async_trait;
pub use ffmpeg::FfmpegTranscoder;
#[cfg(any(test, feature = "test-utils"))]
pub use simulation::{SimulatedBehavior, SimulatedTranscoder};
use tokio_util::sync::CancellationToken;

use crate::source::PayloadReader;
use crate::streams::StreamId;

/// Summary of a finished transcoder run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeOutcome {
    /// Payload bytes written to the transcoder input
    pub bytes_fed: u64,
    /// Diagnostic lines the transcoder emitted
    pub diagnostic_lines: usize,
    /// Diagnostic lines mentioning errors or failures
    pub suspicious_lines: usize,
    /// Segment files present in the output directory at exit
    pub segments: usize,
}

/// Errors from transcoder runs.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Failed to start {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Reading payload failed: {reason}")]
    InputFailed { reason: String },

    #[error("Transcoder exited with {}: {reason}", describe_exit(.exit_code))]
    ExitFailure {
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Transcoding cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

/// Converts a payload byte stream into a playlist plus segments.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Feeds `input` to the transcoder and waits for it to finish writing into
    /// `output_dir`.
    ///
    /// Output files appear progressively while this runs. Cancelling `cancel`
    /// terminates the transcoder and returns `TranscodeError::Cancelled`.
    ///
    /// # Errors
    /// - `TranscodeError::SpawnFailed` - Transcoder could not be started
    /// - `TranscodeError::InputFailed` - Payload reader failed mid-stream
    /// - `TranscodeError::ExitFailure` - Transcoder reported failure through its exit status
    /// - `TranscodeError::Cancelled` - Cancellation was signalled first
    async fn transcode(
        &self,
        stream_id: StreamId,
        input: PayloadReader,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<TranscodeOutcome, TranscodeError>;

    /// File name of the playlist written into every output directory.
    fn playlist_name(&self) -> &str;
}

/// Counts the files in `dir` that carry the extension of `segment_pattern`.
pub(crate) async fn count_segments(
    dir: &Path,
    segment_pattern: &str,
) -> Result<usize, std::io::Error> {
    let extension = Path::new(segment_pattern).extension();
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && entry.path().extension() == extension {
            count += 1;
        }
    }
    Ok(count)
}
