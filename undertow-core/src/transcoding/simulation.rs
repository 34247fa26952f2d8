//! Simulated transcoder for tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::{TranscodeError, TranscodeOutcome, Transcoder, count_segments};
use crate::source::PayloadReader;
use crate::streams::StreamId;

const SEGMENT_PATTERN: &str = "segment%03d.ts";

/// What a [`SimulatedTranscoder`] does after reading its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedBehavior {
    /// Write the playlist and segments, exit 0
    Succeed,
    /// Write what it can, then exit with this code
    Fail { exit_code: i32 },
    /// Write the first segment, then block until cancelled
    Hang,
}

/// Writes one segment per `segment_size` input bytes and a playlist listing them.
#[derive(Debug)]
pub struct SimulatedTranscoder {
    behavior: SimulatedBehavior,
    segment_size: usize,
    playlist_name: String,
    runs: AtomicUsize,
}

impl SimulatedTranscoder {
    pub fn new(behavior: SimulatedBehavior) -> Self {
        Self {
            behavior,
            segment_size: 1024,
            playlist_name: "playlist.m3u8".to_string(),
            runs: AtomicUsize::new(0),
        }
    }

    /// Sets the number of input bytes per segment.
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size.max(1);
        self
    }

    /// Number of `transcode` calls started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    async fn write_playlist(
        &self,
        output_dir: &Path,
        segments: usize,
        complete: bool,
    ) -> Result<(), std::io::Error> {
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
        for index in 0..segments {
            playlist.push_str(&format!("#EXTINF:10.0,\nsegment{index:03}.ts\n"));
        }
        if complete {
            playlist.push_str("#EXT-X-ENDLIST\n");
        }
        tokio::fs::write(output_dir.join(&self.playlist_name), playlist).await
    }
}

#[async_trait]
impl Transcoder for SimulatedTranscoder {
    async fn transcode(
        &self,
        stream_id: StreamId,
        mut input: PayloadReader,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Stream {}: simulated transcode into {}", stream_id, output_dir.display());

        let mut buffer = vec![0u8; self.segment_size];
        let mut bytes_fed: u64 = 0;
        let mut segments = 0;

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(TranscodeError::Cancelled),
                read = input.read(&mut buffer) => read.map_err(|e| TranscodeError::InputFailed {
                    reason: e.to_string(),
                })?,
            };
            if read == 0 {
                break;
            }
            bytes_fed += read as u64;

            let segment = output_dir.join(format!("segment{segments:03}.ts"));
            tokio::fs::write(&segment, &buffer[..read]).await?;
            segments += 1;
            self.write_playlist(output_dir, segments, false).await?;

            if self.behavior == SimulatedBehavior::Hang {
                cancel.cancelled().await;
                return Err(TranscodeError::Cancelled);
            }
        }

        match self.behavior {
            SimulatedBehavior::Succeed => {
                self.write_playlist(output_dir, segments, true).await?;
                Ok(TranscodeOutcome {
                    bytes_fed,
                    diagnostic_lines: 0,
                    suspicious_lines: 0,
                    segments: count_segments(output_dir, SEGMENT_PATTERN).await?,
                })
            }
            SimulatedBehavior::Fail { exit_code } => Err(TranscodeError::ExitFailure {
                exit_code: Some(exit_code),
                reason: "simulated failure".to_string(),
            }),
            SimulatedBehavior::Hang => {
                cancel.cancelled().await;
                Err(TranscodeError::Cancelled)
            }
        }
    }

    fn playlist_name(&self) -> &str {
        &self.playlist_name
    }
}
