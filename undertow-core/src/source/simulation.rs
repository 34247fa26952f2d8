//! In-memory content source for tests

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

use super::{
    ContentSource, InfoHash, MagnetLink, PayloadInfo, PayloadReader, SourceError, SourceHandle,
};

/// Builds a valid magnet descriptor whose info hash is twenty copies of `seed`.
pub fn test_magnet(seed: u8) -> String {
    format!(
        "magnet:?xt=urn:btih:{}&dn=Simulated%20{seed}",
        hex::encode([seed; 20])
    )
}

#[derive(Debug, Clone, Default)]
struct SimulatedResource {
    payloads: Vec<(String, Bytes)>,
    stall_metadata: bool,
    reject: Option<String>,
    failing_reads: bool,
}

/// Content source serving registered in-memory payloads.
///
/// Unregistered descriptors are accepted but never resolve, which is the
/// behaviour of a swarm with no peers.
#[derive(Debug, Default)]
pub struct SimulatedContentSource {
    resources: Mutex<HashMap<InfoHash, SimulatedResource>>,
    released: AtomicUsize,
}

impl SimulatedContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, descriptor: &str, apply: impl FnOnce(&mut SimulatedResource)) {
        let hash = MagnetLink::parse(descriptor)
            .map(|m| m.info_hash)
            .unwrap_or_else(|e| panic!("simulated descriptor must be valid: {e}"));
        apply(self.resources.lock().entry(hash).or_default());
    }

    /// Registers payloads for a descriptor, in listing order.
    pub fn add_payloads(&self, descriptor: &str, payloads: Vec<(&str, Bytes)>) {
        self.update(descriptor, |resource| {
            resource.payloads = payloads
                .into_iter()
                .map(|(name, data)| (name.to_string(), data))
                .collect();
        });
    }

    /// Makes metadata resolution wait forever.
    pub fn stall_metadata(&self, descriptor: &str) {
        self.update(descriptor, |resource| resource.stall_metadata = true);
    }

    /// Makes `accept` refuse the descriptor.
    pub fn reject(&self, descriptor: &str, reason: &str) {
        self.update(descriptor, |resource| {
            resource.reject = Some(reason.to_string());
        });
    }

    /// Makes payload readers fail on first read.
    pub fn fail_reads(&self, descriptor: &str) {
        self.update(descriptor, |resource| resource.failing_reads = true);
    }

    /// Number of `release` calls observed.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn resource(&self, handle: &SourceHandle) -> Option<SimulatedResource> {
        self.resources.lock().get(&handle.info_hash()).cloned()
    }
}

#[async_trait]
impl ContentSource for SimulatedContentSource {
    async fn accept(&self, descriptor: &str) -> Result<SourceHandle, SourceError> {
        let magnet = MagnetLink::parse(descriptor)?;
        let handle = SourceHandle::new(magnet);
        if let Some(reason) = self.resource(&handle).and_then(|r| r.reject) {
            return Err(SourceError::Rejected { reason });
        }
        Ok(handle)
    }

    async fn await_metadata(&self, handle: &SourceHandle) -> Result<(), SourceError> {
        match self.resource(handle) {
            Some(resource) if !resource.stall_metadata => Ok(()),
            _ => std::future::pending().await,
        }
    }

    async fn list_payloads(&self, handle: &SourceHandle) -> Result<Vec<PayloadInfo>, SourceError> {
        let resource = self
            .resource(handle)
            .ok_or_else(|| SourceError::MetadataUnavailable {
                reason: "unknown resource".to_string(),
            })?;
        Ok(resource
            .payloads
            .iter()
            .map(|(name, data)| PayloadInfo::new(name.clone(), data.len() as u64))
            .collect())
    }

    async fn open_reader(
        &self,
        handle: &SourceHandle,
        payload: &PayloadInfo,
    ) -> Result<PayloadReader, SourceError> {
        let resource = self
            .resource(handle)
            .ok_or_else(|| SourceError::PayloadNotFound {
                name: payload.name.clone(),
            })?;
        if resource.failing_reads {
            return Ok(Box::new(FailingReader));
        }
        let data = resource
            .payloads
            .into_iter()
            .find(|(name, _)| *name == payload.name)
            .map(|(_, data)| data)
            .ok_or_else(|| SourceError::PayloadNotFound {
                name: payload.name.clone(),
            })?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn release(&self, _handle: &SourceHandle) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn source_type(&self) -> &'static str {
        "simulated"
    }
}

struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "simulated peer disconnect",
        )))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_registered_payloads_are_readable() {
        let source = SimulatedContentSource::new();
        let magnet = test_magnet(1);
        source.add_payloads(&magnet, vec![("a.mkv", Bytes::from_static(b"hello"))]);

        let handle = source.accept(&magnet).await.unwrap();
        source.await_metadata(&handle).await.unwrap();
        let payloads = source.list_payloads(&handle).await.unwrap();
        assert_eq!(payloads, vec![PayloadInfo::new("a.mkv", 5)]);

        let mut reader = source.open_reader(&handle, &payloads[0]).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_unregistered_descriptor_stalls() {
        let source = SimulatedContentSource::new();
        let handle = source.accept(&test_magnet(9)).await.unwrap();
        let wait = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            source.await_metadata(&handle),
        )
        .await;
        assert!(wait.is_err());
    }

    #[tokio::test]
    async fn test_rejection() {
        let source = SimulatedContentSource::new();
        let magnet = test_magnet(2);
        source.reject(&magnet, "blocked");
        assert!(matches!(
            source.accept(&magnet).await,
            Err(SourceError::Rejected { .. })
        ));
    }
}
