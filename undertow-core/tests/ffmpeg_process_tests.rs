//! Process-level transcoder tests using shell scripts in place of ffmpeg.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use undertow_core::config::TranscoderConfig;
use undertow_core::source::LibrarySource;
use undertow_core::{
    FfmpegTranscoder, StreamId, StreamOrchestrator, StreamState, TranscodeError, Transcoder,
    UndertowConfig,
};

/// Copies stdin into one segment and writes a playlist next to the last argument.
const SEGMENTING_SCRIPT: &str = r#"#!/bin/sh
for last; do :; done
dir=$(dirname "$last")
echo "Input #0, matroska,webm, from 'pipe:0':" >&2
cat > "$dir/segment000.ts"
echo "[h264 @ 0x1] error while decoding MB 3 7, bytestream -5" >&2
printf '#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nsegment000.ts\n#EXT-X-ENDLIST\n' > "$last"
exit 0
"#;

const FAILING_SCRIPT: &str = r#"#!/bin/sh
cat > /dev/null
echo "pipe:0: Invalid data found when processing input" >&2
exit 1
"#;

/// Records its pid next to itself, then blocks until killed.
const HANGING_SCRIPT: &str = r#"#!/bin/sh
echo $$ > "$(dirname "$0")/transcoder.pid"
exec sleep 30
"#;

fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `kill -0` succeeds only while the pid names a live (or unreaped) process.
fn process_exists(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn transcoder(script: PathBuf) -> FfmpegTranscoder {
    let config = TranscoderConfig {
        ffmpeg_path: script,
        ..TranscoderConfig::default()
    };
    FfmpegTranscoder::new(config, 4096)
}

#[tokio::test]
async fn test_success_is_judged_by_exit_status_not_diagnostics() {
    let scripts = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let transcoder = transcoder(install_script(scripts.path(), "ffmpeg", SEGMENTING_SCRIPT));

    let payload = vec![9u8; 100_000];
    let outcome = transcoder
        .transcode(
            StreamId::new(),
            Box::new(std::io::Cursor::new(payload.clone())),
            output.path(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.bytes_fed, payload.len() as u64);
    assert_eq!(outcome.segments, 1);
    assert_eq!(outcome.diagnostic_lines, 2);
    assert_eq!(outcome.suspicious_lines, 1);
    assert_eq!(
        std::fs::read(output.path().join("segment000.ts")).unwrap(),
        payload
    );
    assert!(output.path().join("playlist.m3u8").is_file());
}

#[tokio::test]
async fn test_non_zero_exit_is_failure_with_diagnostics() {
    let scripts = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let transcoder = transcoder(install_script(scripts.path(), "ffmpeg", FAILING_SCRIPT));

    let result = transcoder
        .transcode(
            StreamId::new(),
            Box::new(std::io::Cursor::new(vec![0u8; 1024])),
            output.path(),
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(TranscodeError::ExitFailure { exit_code, reason }) => {
            assert_eq!(exit_code, Some(1));
            assert!(reason.contains("Invalid data found"), "{reason}");
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancellation_kills_the_process() {
    let scripts = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let transcoder = transcoder(install_script(scripts.path(), "ffmpeg", HANGING_SCRIPT));
    let pid_file = scripts.path().join("transcoder.pid");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watched = pid_file.clone();
    let recorded_pid = tokio::spawn(async move {
        let pid = loop {
            if let Ok(text) = std::fs::read_to_string(&watched)
                && let Ok(pid) = text.trim().parse::<u32>()
            {
                break pid;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        trigger.cancel();
        pid
    });

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        transcoder.transcode(
            StreamId::new(),
            Box::new(std::io::Cursor::new(vec![0u8; 16])),
            output.path(),
            cancel,
        ),
    )
    .await
    .expect("transcode did not return after cancellation");

    assert!(matches!(result, Err(TranscodeError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = recorded_pid.await.unwrap();
    let gone = tokio::time::timeout(Duration::from_secs(2), async {
        while process_exists(pid) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "transcoder process {pid} still running");
}

#[tokio::test]
async fn test_library_stream_end_to_end() {
    let scripts = tempfile::tempdir().unwrap();
    let library = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    let hash = "aabbccddeeff00112233445566778899aabbccdd";
    let resource = library.path().join(hash);
    std::fs::create_dir_all(&resource).unwrap();
    std::fs::write(resource.join("sample.mkv"), vec![1u8; 100]).unwrap();
    std::fs::write(resource.join("feature.mkv"), vec![2u8; 5000]).unwrap();

    let mut config = UndertowConfig::for_testing();
    config.storage.work_root = Some(work.path().to_path_buf());
    let source = Arc::new(LibrarySource::new(
        library.path().to_path_buf(),
        Duration::from_millis(10),
    ));
    let orchestrator = StreamOrchestrator::new(
        &config,
        source,
        Arc::new(transcoder(install_script(
            scripts.path(),
            "ffmpeg",
            SEGMENTING_SCRIPT,
        ))),
    )
    .unwrap();

    let submitted = orchestrator
        .submit(&format!("magnet:?xt=urn:btih:{hash}&dn=Feature"))
        .await
        .unwrap();

    let record = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let record = orchestrator.get(submitted.id).unwrap();
            if record.state.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(record.state, StreamState::Ready, "{:?}", record.last_error);
    assert_eq!(record.payload.unwrap().name, "feature.mkv");
    let segment = orchestrator
        .segment_path(submitted.id, "segment000.ts")
        .unwrap();
    assert_eq!(std::fs::read(segment).unwrap().len(), 5000);

    let base = orchestrator.base_dir().to_path_buf();
    assert!(base.starts_with(work.path()));
    orchestrator.shutdown().await;
    assert!(!base.exists());
}
