//! In-memory stream table
//!
//! Every read and write of a stream record goes through this type. Writers
//! take the lock exclusively for the duration of one field update; readers get
//! a cloned snapshot so no lock is ever held across an await point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use super::state::StreamState;
use super::types::{PipelineError, StreamId, StreamRecord};
use crate::source::PayloadInfo;

/// Errors from registry updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Stream {id} not found")]
    NotFound { id: StreamId },

    #[error("Stream {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: StreamId,
        from: StreamState,
        to: StreamState,
    },

    #[error("Stream {id} already has a {field}")]
    AlreadySet { id: StreamId, field: &'static str },
}

/// Table of stream records keyed by id.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamId, StreamRecord>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh record in `Initializing` and returns its id.
    pub fn create(&self, descriptor: impl Into<String>) -> StreamId {
        let record = StreamRecord::new(descriptor.into());
        let id = record.id;
        self.streams.write().insert(id, record);
        tracing::debug!("Stream {} created", id);
        id
    }

    /// Snapshot of one record.
    pub fn get(&self, id: StreamId) -> Option<StreamRecord> {
        self.streams.read().get(&id).cloned()
    }

    /// Moves a stream to `to`, recording `error` alongside when given.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` - Record was evicted or never existed
    /// - `RegistryError::InvalidTransition` - Move would go backwards or leave a terminal state
    pub fn transition(
        &self,
        id: StreamId,
        to: StreamState,
        error: Option<PipelineError>,
    ) -> Result<StreamRecord, RegistryError> {
        let mut streams = self.streams.write();
        let record = streams.get_mut(&id).ok_or(RegistryError::NotFound { id })?;

        let from = record.state;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition { id, from, to });
        }

        record.state = to;
        record.updated_at = Utc::now();
        if let Some(error) = error {
            tracing::warn!("Stream {}: {} -> {} ({})", id, from, to, error);
            record.last_error = Some(error);
        } else {
            tracing::info!("Stream {}: {} -> {}", id, from, to);
        }

        Ok(record.clone())
    }

    /// Records the payload chosen for transcoding. Set once.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` - Record missing
    /// - `RegistryError::AlreadySet` - A payload was already recorded
    pub fn attach_payload(&self, id: StreamId, payload: PayloadInfo) -> Result<(), RegistryError> {
        let mut streams = self.streams.write();
        let record = streams.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if record.payload.is_some() {
            return Err(RegistryError::AlreadySet {
                id,
                field: "payload",
            });
        }
        record.payload = Some(payload);
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Records the working directory. Set once.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` - Record missing
    /// - `RegistryError::AlreadySet` - A directory was already recorded
    pub fn attach_working_dir(&self, id: StreamId, dir: PathBuf) -> Result<(), RegistryError> {
        let mut streams = self.streams.write();
        let record = streams.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if record.working_dir.is_some() {
            return Err(RegistryError::AlreadySet {
                id,
                field: "working directory",
            });
        }
        record.working_dir = Some(dir);
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Removes a record, returning its last snapshot.
    pub fn remove(&self, id: StreamId) -> Option<StreamRecord> {
        self.streams.write().remove(&id)
    }

    /// Snapshots of all records, oldest first.
    pub fn list(&self) -> Vec<StreamRecord> {
        let mut records: Vec<_> = self.streams.read().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Terminal streams whose last update is older than `ttl`.
    pub fn expired(&self, ttl: Duration) -> Vec<StreamId> {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - ttl;
        self.streams
            .read()
            .values()
            .filter(|r| r.state.is_terminal() && r.updated_at <= cutoff)
            .map(|r| r.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}
