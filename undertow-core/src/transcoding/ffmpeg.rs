//! External FFmpeg process producing HLS output

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio_util::sync::CancellationToken;

use super::{TranscodeError, TranscodeOutcome, Transcoder, count_segments};
use crate::config::TranscoderConfig;
use crate::source::PayloadReader;
use crate::streams::StreamId;

/// Diagnostic lines kept for failure reports.
const DIAGNOSTIC_TAIL: usize = 8;

/// Words that mark a diagnostic line as worth a warning.
const SUSPICIOUS_WORDS: [&str; 2] = ["error", "failed"];

/// Runs `ffmpeg` with the payload on stdin and HLS output on disk.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
    copy_buffer_size: usize,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig, copy_buffer_size: usize) -> Self {
        Self {
            config,
            copy_buffer_size: copy_buffer_size.max(1),
        }
    }

    /// Checks that the configured binary runs and returns its version line.
    ///
    /// # Errors
    /// - `TranscodeError::SpawnFailed` - Binary missing or not executable
    /// - `TranscodeError::ExitFailure` - Binary ran but reported failure
    pub async fn probe(&self) -> Result<String, TranscodeError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_failed(e))?;

        if !output.status.success() {
            return Err(TranscodeError::ExitFailure {
                exit_code: output.status.code(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Command line for one run writing into `output_dir`.
    pub fn build_args(&self, output_dir: &Path) -> Vec<OsString> {
        let segment_seconds = self.config.segment_seconds.to_string();
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostats",
            "-y",
            "-i",
            "pipe:0",
            "-c:v",
            self.config.video_codec.as_str(),
            "-c:a",
            self.config.audio_codec.as_str(),
            "-f",
            "hls",
            "-hls_time",
            segment_seconds.as_str(),
            "-hls_list_size",
            "0",
            "-hls_segment_filename",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(output_dir.join(&self.config.segment_pattern).into_os_string());
        args.push(output_dir.join(&self.config.playlist_name).into_os_string());
        args
    }

    fn spawn_failed(&self, error: std::io::Error) -> TranscodeError {
        TranscodeError::SpawnFailed {
            program: self.config.ffmpeg_path.display().to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        stream_id: StreamId,
        mut input: PayloadReader,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let start_time = Instant::now();
        let args = self.build_args(output_dir);
        tracing::debug!("Stream {}: ffmpeg args {:?}", stream_id, args);

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_failed(e))?;

        tracing::info!(
            "Stream {}: ffmpeg started (pid {:?}) writing to {}",
            stream_id,
            child.id(),
            output_dir.display()
        );

        let stdin = child.stdin.take().ok_or_else(|| TranscodeError::SpawnFailed {
            program: self.config.ffmpeg_path.display().to_string(),
            reason: "stdin not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| TranscodeError::SpawnFailed {
            program: self.config.ffmpeg_path.display().to_string(),
            reason: "stderr not captured".to_string(),
        })?;

        let diagnostics = tokio::spawn(drain_diagnostics(stream_id, stderr));

        let run = async {
            let fed = feed_input(&mut input, stdin, self.copy_buffer_size).await;
            if fed.is_err() {
                let _ = child.start_kill();
            }
            let status = child.wait().await;
            (fed, status)
        };

        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            result = run => Some(result),
        };

        let Some((fed, status)) = finished else {
            if let Err(e) = child.kill().await {
                tracing::warn!("Stream {}: failed to kill ffmpeg: {}", stream_id, e);
            }
            let summary = diagnostics.await.unwrap_or_default();
            tracing::info!(
                "Stream {}: ffmpeg terminated by cancellation after {} diagnostic lines",
                stream_id,
                summary.lines
            );
            return Err(TranscodeError::Cancelled);
        };

        // stderr must be fully drained before the run counts as finished
        let summary = diagnostics.await.unwrap_or_default();

        let bytes_fed = fed?;
        let status = status?;

        if !status.success() {
            tracing::error!(
                "Stream {}: ffmpeg failed with {} after {} bytes",
                stream_id,
                status,
                bytes_fed
            );
            return Err(TranscodeError::ExitFailure {
                exit_code: status.code(),
                reason: summary.failure_reason(),
            });
        }

        let segments = count_segments(output_dir, &self.config.segment_pattern).await?;
        tracing::info!(
            "Stream {}: ffmpeg finished in {:.2}s, {} bytes in, {} segments out",
            stream_id,
            start_time.elapsed().as_secs_f64(),
            bytes_fed,
            segments
        );

        Ok(TranscodeOutcome {
            bytes_fed,
            diagnostic_lines: summary.lines,
            suspicious_lines: summary.suspicious,
            segments,
        })
    }

    fn playlist_name(&self) -> &str {
        &self.config.playlist_name
    }
}

/// Copies the payload into the transcoder's stdin, then closes it.
///
/// A broken pipe means the transcoder stopped reading; that is left for the
/// exit status to judge.
async fn feed_input(
    input: &mut PayloadReader,
    mut stdin: ChildStdin,
    buffer_size: usize,
) -> Result<u64, TranscodeError> {
    let mut buffer = vec![0u8; buffer_size];
    let mut total: u64 = 0;

    loop {
        let read = input
            .read(&mut buffer)
            .await
            .map_err(|e| TranscodeError::InputFailed {
                reason: e.to_string(),
            })?;
        if read == 0 {
            break;
        }

        match stdin.write_all(&buffer[..read]).await {
            Ok(()) => total += read as u64,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("Transcoder closed its input after {} bytes", total);
                return Ok(total);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = stdin.shutdown().await
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }
    Ok(total)
}

#[derive(Debug, Default)]
struct DiagnosticSummary {
    lines: usize,
    suspicious: usize,
    tail: VecDeque<String>,
}

impl DiagnosticSummary {
    fn record(&mut self, line: String) {
        self.lines += 1;
        if self.tail.len() == DIAGNOSTIC_TAIL {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }

    fn failure_reason(&self) -> String {
        if self.tail.is_empty() {
            "no diagnostic output".to_string()
        } else {
            self.tail.iter().cloned().collect::<Vec<_>>().join(" | ")
        }
    }
}

fn is_suspicious(line: &str) -> bool {
    let lower = line.to_lowercase();
    SUSPICIOUS_WORDS.iter().any(|word| lower.contains(word))
}

async fn drain_diagnostics(stream_id: StreamId, stderr: ChildStderr) -> DiagnosticSummary {
    let mut summary = DiagnosticSummary::default();
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if is_suspicious(&line) {
                    summary.suspicious += 1;
                    tracing::warn!("Stream {} ffmpeg: {}", stream_id, line);
                } else {
                    tracing::debug!("Stream {} ffmpeg: {}", stream_id, line);
                }
                summary.record(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stream {}: stderr read ended: {}", stream_id, e);
                break;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_build_args() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::default(), 65536);
        let args: Vec<String> = transcoder
            .build_args(Path::new("/tmp/hls-1"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..5], &["-hide_banner", "-nostats", "-y", "-i", "pipe:0"]);
        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[position("-c:v") + 1], "libx264");
        assert_eq!(args[position("-c:a") + 1], "aac");
        assert_eq!(args[position("-f") + 1], "hls");
        assert_eq!(args[position("-hls_time") + 1], "10");
        assert_eq!(args[position("-hls_list_size") + 1], "0");
        assert_eq!(
            PathBuf::from(&args[position("-hls_segment_filename") + 1]),
            Path::new("/tmp/hls-1").join("segment%03d.ts")
        );
        assert_eq!(
            PathBuf::from(args.last().unwrap()),
            Path::new("/tmp/hls-1").join("playlist.m3u8")
        );
    }

    #[test]
    fn test_suspicious_lines() {
        assert!(is_suspicious("Error while decoding stream #0:1"));
        assert!(is_suspicious("Conversion FAILED!"));
        assert!(!is_suspicious("Stream #0:0: Video: h264"));
    }

    #[test]
    fn test_failure_reason_keeps_tail() {
        let mut summary = DiagnosticSummary::default();
        for i in 0..20 {
            summary.record(format!("line {i}"));
        }
        assert_eq!(summary.lines, 20);
        assert_eq!(summary.tail.len(), DIAGNOSTIC_TAIL);
        assert!(summary.failure_reason().starts_with("line 12"));
        assert!(summary.failure_reason().ends_with("line 19"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let config = TranscoderConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..TranscoderConfig::default()
        };
        let transcoder = FfmpegTranscoder::new(config, 1024);
        let temp = tempfile::tempdir().unwrap();

        let result = transcoder
            .transcode(
                StreamId::new(),
                Box::new(std::io::Cursor::new(vec![0u8; 16])),
                temp.path(),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TranscodeError::SpawnFailed { .. })));

        assert!(matches!(
            transcoder.probe().await,
            Err(TranscodeError::SpawnFailed { .. })
        ));
    }
}
