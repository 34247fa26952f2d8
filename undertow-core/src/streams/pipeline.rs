//! Per-stream pipeline: metadata, payload selection, storage, transcoding

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::{RegistryError, StreamRegistry};
use super::state::StreamState;
use super::types::{PipelineError, StreamId};
use crate::source::{ContentSource, SourceHandle, select_main_payload};
use crate::transcoding::{TranscodeOutcome, Transcoder};

/// Why a pipeline run stopped early.
#[derive(Debug)]
enum Halt {
    Failed(PipelineError),
    Registry(RegistryError),
}

impl From<PipelineError> for Halt {
    fn from(error: PipelineError) -> Self {
        Halt::Failed(error)
    }
}

impl From<RegistryError> for Halt {
    fn from(error: RegistryError) -> Self {
        Halt::Registry(error)
    }
}

impl From<crate::source::SourceError> for Halt {
    fn from(error: crate::source::SourceError) -> Self {
        Halt::Failed(error.into())
    }
}

/// Drives one stream from `GettingInfo` to a terminal state.
///
/// Every state change goes through the registry. A failure at any step moves
/// the stream to `Error` and deletes whatever the run wrote to disk; nothing is
/// retried.
#[derive(Clone)]
pub struct PipelineDriver {
    registry: Arc<StreamRegistry>,
    source: Arc<dyn ContentSource>,
    transcoder: Arc<dyn Transcoder>,
    base_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl PipelineDriver {
    pub fn new(
        registry: Arc<StreamRegistry>,
        source: Arc<dyn ContentSource>,
        transcoder: Arc<dyn Transcoder>,
        base_dir: PathBuf,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            source,
            transcoder,
            base_dir,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Working directory a stream's output goes to.
    pub fn working_dir_for(&self, id: StreamId) -> PathBuf {
        self.base_dir.join(format!("hls-{id}"))
    }

    /// Runs the pipeline for an accepted stream until it reaches a terminal
    /// state, is cancelled, or its record disappears.
    pub async fn run(&self, id: StreamId, handle: SourceHandle, cancel: CancellationToken) {
        let mut created_dir = None;
        let result = self.drive(id, &handle, &cancel, &mut created_dir).await;
        self.source.release(&handle).await;

        match result {
            Ok(outcome) => {
                info!(
                    "Stream {} ready: {} bytes transcoded into {} segments",
                    id, outcome.bytes_fed, outcome.segments
                );
                if outcome.suspicious_lines > 0 {
                    debug!(
                        "Stream {} succeeded despite {} suspicious transcoder lines",
                        id, outcome.suspicious_lines
                    );
                }
            }
            Err(Halt::Failed(failure)) => {
                match self
                    .registry
                    .transition(id, StreamState::Error, Some(failure))
                {
                    Ok(_) | Err(RegistryError::NotFound { .. }) => {}
                    Err(e) => error!("Stream {}: could not record failure: {}", id, e),
                }
                remove_partial_output(id, created_dir.as_deref()).await;
            }
            Err(Halt::Registry(RegistryError::NotFound { .. })) => {
                debug!("Stream {} was evicted, stopping pipeline", id);
                remove_partial_output(id, created_dir.as_deref()).await;
            }
            Err(Halt::Registry(e)) => {
                error!("Stream {}: registry rejected pipeline update: {}", id, e);
                let failure = PipelineError::Internal {
                    reason: e.to_string(),
                };
                if let Err(e) = self
                    .registry
                    .transition(id, StreamState::Error, Some(failure))
                {
                    debug!("Stream {}: could not record internal failure: {}", id, e);
                }
                remove_partial_output(id, created_dir.as_deref()).await;
            }
        }
    }

    async fn drive(
        &self,
        id: StreamId,
        handle: &SourceHandle,
        cancel: &CancellationToken,
        created_dir: &mut Option<PathBuf>,
    ) -> Result<TranscodeOutcome, Halt> {
        let cancelled_in = |stage| Halt::Failed(PipelineError::Cancelled { stage });

        debug!(
            "Stream {}: waiting for metadata from {} source",
            id,
            self.source.source_type()
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_in(StreamState::GettingInfo)),
            resolved = self.source.await_metadata(handle) => resolved?,
        }

        let payloads = self.source.list_payloads(handle).await?;
        let payload = select_main_payload(&payloads)
            .cloned()
            .ok_or(PipelineError::NoPayloads)?;
        info!(
            "Stream {}: selected {} ({} bytes) out of {} payloads",
            id,
            payload.name,
            payload.length,
            payloads.len()
        );
        self.registry.attach_payload(id, payload.clone())?;

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_in(StreamState::GettingInfo)),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|e| PipelineError::Internal { reason: e.to_string() })?
            }
        };
        self.registry
            .transition(id, StreamState::Downloading, None)?;

        if cancel.is_cancelled() {
            return Err(cancelled_in(StreamState::Downloading));
        }
        let dir = self.working_dir_for(id);
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| PipelineError::Storage {
                reason: format!("{}: {e}", dir.display()),
            })?;
        *created_dir = Some(dir.clone());
        self.registry.attach_working_dir(id, dir.clone())?;
        self.registry
            .transition(id, StreamState::Transcoding, None)?;

        let reader = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_in(StreamState::Transcoding)),
            reader = self.source.open_reader(handle, &payload) => reader?,
        };

        let outcome = self
            .transcoder
            .transcode(id, reader, &dir, cancel.clone())
            .await
            .map_err(PipelineError::from_transcode)?;

        self.registry.transition(id, StreamState::Ready, None)?;
        Ok(outcome)
    }
}

async fn remove_partial_output(id: StreamId, dir: Option<&Path>) {
    let Some(dir) = dir else {
        return;
    };
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Stream {}: removed {}", id, dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Stream {}: failed to remove {}: {}", id, dir.display(), e),
    }
}
