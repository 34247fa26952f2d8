//! Stream orchestrator: the entry point for submitting, querying and
//! tearing down streams.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pipeline::PipelineDriver;
use super::registry::{RegistryError, StreamRegistry};
use super::segments::{SegmentError, validate_file_name};
use super::state::StreamState;
use super::types::{PipelineError, StreamId, StreamRecord};
use crate::config::UndertowConfig;
use crate::source::{ContentSource, SourceError};
use crate::transcoding::Transcoder;

/// Errors from orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Stream {id} not found")]
    StreamNotFound { id: StreamId },

    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {reason}")]
    Storage { reason: String },

    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}

struct PipelineTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every stream and the background task driving it.
///
/// Working directories live under one private base directory that is removed
/// on [`shutdown`](Self::shutdown) or when the orchestrator is dropped.
pub struct StreamOrchestrator {
    registry: Arc<StreamRegistry>,
    source: Arc<dyn ContentSource>,
    driver: PipelineDriver,
    playlist_name: String,
    base_path: PathBuf,
    base_dir: Mutex<Option<TempDir>>,
    tasks: Mutex<HashMap<StreamId, PipelineTask>>,
    shutdown_token: CancellationToken,
    shutdown_grace: Duration,
}

impl StreamOrchestrator {
    /// Creates an orchestrator with its private base directory.
    ///
    /// # Errors
    /// - `OrchestratorError::Storage` - Base directory could not be created
    pub fn new(
        config: &UndertowConfig,
        source: Arc<dyn ContentSource>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self, OrchestratorError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("undertow-");
        let base_dir = match &config.storage.work_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| OrchestratorError::Storage {
                    reason: format!("{}: {e}", root.display()),
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| OrchestratorError::Storage {
            reason: e.to_string(),
        })?;

        let base_path = base_dir.path().to_path_buf();
        info!("Stream working directories under {}", base_path.display());

        let registry = Arc::new(StreamRegistry::new());
        let playlist_name = transcoder.playlist_name().to_string();
        let driver = PipelineDriver::new(
            Arc::clone(&registry),
            Arc::clone(&source),
            transcoder,
            base_path.clone(),
            config.streams.max_concurrent_pipelines,
        );

        Ok(Self {
            registry,
            source,
            driver,
            playlist_name,
            base_path,
            base_dir: Mutex::new(Some(base_dir)),
            tasks: Mutex::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
            shutdown_grace: config.transcoder.shutdown_grace,
        })
    }

    /// Creates an orchestrator and starts the eviction sweeper when a stream
    /// TTL is configured.
    ///
    /// # Errors
    /// - `OrchestratorError::Storage` - Base directory could not be created
    pub fn start(
        config: &UndertowConfig,
        source: Arc<dyn ContentSource>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let orchestrator = Arc::new(Self::new(config, source, transcoder)?);
        if let Some(ttl) = config.streams.stream_ttl {
            orchestrator.spawn_sweeper(ttl, config.streams.sweep_interval);
        }
        Ok(orchestrator)
    }

    /// Registers a stream and starts its pipeline in the background.
    ///
    /// Returns as soon as the source has accepted the descriptor. If it does
    /// not, the record is still kept, in `Error`, for later queries.
    ///
    /// # Errors
    /// - `OrchestratorError::Source` - Descriptor malformed or refused by the source
    /// - `OrchestratorError::ShuttingDown` - Shutdown already started
    pub async fn submit(&self, descriptor: &str) -> Result<StreamRecord, OrchestratorError> {
        if self.shutdown_token.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let id = self.registry.create(descriptor);

        let source_handle = match self.source.accept(descriptor).await {
            Ok(handle) => handle,
            Err(e) => {
                let failure = PipelineError::Acquisition {
                    reason: e.to_string(),
                };
                self.registry
                    .transition(id, StreamState::Error, Some(failure))?;
                return Err(e.into());
            }
        };

        let record = self
            .registry
            .transition(id, StreamState::GettingInfo, None)?;

        {
            let mut tasks = self.tasks.lock();
            tasks.retain(|_, task| !task.handle.is_finished());
            match tasks.entry(id) {
                Entry::Occupied(_) => {
                    // ids are never reused, so a live entry means a bookkeeping bug
                    warn!("Stream {} already has a pipeline; not starting another", id);
                }
                Entry::Vacant(slot) => {
                    let cancel = self.shutdown_token.child_token();
                    let driver = self.driver.clone();
                    let task_cancel = cancel.clone();
                    let handle = tokio::spawn(async move {
                        driver.run(id, source_handle, task_cancel).await;
                    });
                    slot.insert(PipelineTask { cancel, handle });
                }
            }
        }

        info!("Stream {} submitted", id);
        Ok(record)
    }

    pub fn get(&self, id: StreamId) -> Option<StreamRecord> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<StreamRecord> {
        self.registry.list()
    }

    pub fn stream_count(&self) -> usize {
        self.registry.len()
    }

    /// Playlist file name inside every working directory.
    pub fn playlist_name(&self) -> &str {
        &self.playlist_name
    }

    /// Private directory holding all working directories.
    pub fn base_dir(&self) -> &Path {
        &self.base_path
    }

    /// Resolves a requested file of a stream to its path on disk.
    ///
    /// The name is validated before the stream is looked up. Only streams in
    /// `Transcoding` or `Ready` have something to serve. The
    /// returned path may not exist yet while transcoding is in progress.
    ///
    /// # Errors
    /// - `SegmentError::InvalidFileName` - Name escapes the working directory
    /// - `SegmentError::StreamNotFound` - Unknown stream
    /// - `SegmentError::NotAvailable` - No servable directory for the stream
    pub fn segment_path(&self, id: StreamId, file_name: &str) -> Result<PathBuf, SegmentError> {
        validate_file_name(file_name)?;
        let record = self
            .registry
            .get(id)
            .ok_or(SegmentError::StreamNotFound { id })?;
        record
            .servable_dir()
            .map(|dir| dir.join(file_name))
            .ok_or(SegmentError::NotAvailable { id })
    }

    /// Signals a stream's pipeline to stop. The stream ends in `Error`.
    ///
    /// # Errors
    /// - `OrchestratorError::StreamNotFound` - Unknown stream
    pub fn cancel(&self, id: StreamId) -> Result<(), OrchestratorError> {
        if self.registry.get(id).is_none() {
            return Err(OrchestratorError::StreamNotFound { id });
        }
        if let Some(task) = self.tasks.lock().get(&id) {
            task.cancel.cancel();
            debug!("Stream {} cancellation requested", id);
        }
        Ok(())
    }

    /// Stops a stream, waits for its pipeline, removes its record and files.
    ///
    /// # Errors
    /// - `OrchestratorError::StreamNotFound` - Unknown stream
    pub async fn evict(&self, id: StreamId) -> Result<StreamRecord, OrchestratorError> {
        if self.registry.get(id).is_none() {
            return Err(OrchestratorError::StreamNotFound { id });
        }

        let task = self.tasks.lock().remove(&id);
        if let Some(task) = task {
            task.cancel.cancel();
            self.join_task(id, task.handle).await;
        }

        let record = self
            .registry
            .remove(id)
            .ok_or(OrchestratorError::StreamNotFound { id })?;

        if let Some(dir) = &record.working_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Stream {}: failed to remove {}: {}", id, dir.display(), e),
            }
        }

        info!("Stream {} evicted ({})", id, record.state);
        Ok(record)
    }

    /// Evicts terminal streams not updated for `ttl`. Returns how many went.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let mut evicted = 0;
        for id in self.registry.expired(ttl) {
            if self.evict(id).await.is_ok() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!("Evicted {} expired streams", evicted);
        }
        evicted
    }

    fn spawn_sweeper(self: &Arc<Self>, ttl: Duration, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown_token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.sweep_expired(ttl).await;
            }
            debug!("Stream sweeper stopped");
        });
    }

    /// Cancels every pipeline, waits for them within the grace period and
    /// removes the base directory. Later submissions are refused.
    pub async fn shutdown(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        info!("Shutting down {} streams", self.registry.len());
        self.shutdown_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain().collect();
        for (id, task) in tasks {
            self.join_task(id, task.handle).await;
        }

        let base_dir = self.base_dir.lock().take();
        if let Some(base_dir) = base_dir {
            let path = base_dir.path().to_path_buf();
            if let Err(e) = tokio::fs::remove_dir_all(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
            drop(base_dir);
        }
        info!("Shutdown complete");
    }

    async fn join_task(&self, id: StreamId, mut handle: JoinHandle<()>) {
        match tokio::time::timeout(self.shutdown_grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Stream {} pipeline task failed: {}", id, e),
            Err(_) => {
                warn!(
                    "Stream {} pipeline did not stop within {:?}; aborting",
                    id, self.shutdown_grace
                );
                handle.abort();
            }
        }
    }
}

impl Drop for StreamOrchestrator {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
