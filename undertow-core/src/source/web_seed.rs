//! HTTP web seed source (BEP 19 `ws=` parameters)

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use parking_lot::Mutex;
use reqwest::header::CONTENT_LENGTH;
use tokio_util::io::StreamReader;
use url::Url;
use uuid::Uuid;

use super::{ContentSource, MagnetLink, PayloadInfo, PayloadReader, SourceError, SourceHandle};

/// Reads single-file resources straight from the web seeds a magnet advertises.
///
/// Resolved metadata is kept per handle: two streams of the same magnet
/// resolve and release independently.
pub struct WebSeedSource {
    client: reqwest::Client,
    request_timeout: Duration,
    resolved: Mutex<HashMap<Uuid, PayloadInfo>>,
}

impl WebSeedSource {
    /// Creates a source with the given metadata request timeout.
    ///
    /// The timeout bounds connection setup and `HEAD` requests only; payload
    /// downloads run as long as the transcoder keeps reading.
    ///
    /// # Errors
    /// - `SourceError::Http` - Client construction failed
    pub fn new(request_timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("undertow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            request_timeout,
            resolved: Mutex::new(HashMap::new()),
        })
    }

    fn primary_seed(handle: &SourceHandle) -> Result<&Url, SourceError> {
        handle
            .magnet
            .web_seeds
            .first()
            .ok_or_else(|| SourceError::Rejected {
                reason: "magnet link has no HTTP web seed".to_string(),
            })
    }

    async fn fetch_payload_info(&self, handle: &SourceHandle) -> Result<PayloadInfo, SourceError> {
        let seed = Self::primary_seed(handle)?;
        let response = self
            .client
            .head(seed.clone())
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;

        // HEAD bodies are empty, so the header is read directly
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .or(handle.magnet.exact_length)
            .ok_or_else(|| SourceError::MetadataUnavailable {
                reason: format!("{seed} did not report a Content-Length"),
            })?;

        Ok(PayloadInfo::new(payload_name(&handle.magnet, seed), length))
    }
}

/// Payload name: the display name if present, otherwise the last path segment.
fn payload_name(magnet: &MagnetLink, seed: &Url) -> String {
    if let Some(name) = &magnet.display_name
        && !name.is_empty()
    {
        return name.clone();
    }

    seed.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_else(|| magnet.info_hash.to_string())
}

#[async_trait]
impl ContentSource for WebSeedSource {
    async fn accept(&self, descriptor: &str) -> Result<SourceHandle, SourceError> {
        let magnet = MagnetLink::parse(descriptor)?;
        let handle = SourceHandle::new(magnet);
        let seed = Self::primary_seed(&handle)?;
        tracing::debug!("Web seed source accepted {} via {}", handle.info_hash(), seed);
        Ok(handle)
    }

    async fn await_metadata(&self, handle: &SourceHandle) -> Result<(), SourceError> {
        if self.resolved.lock().contains_key(&handle.key()) {
            return Ok(());
        }

        let info = self.fetch_payload_info(handle).await?;
        tracing::info!(
            "Resolved web seed payload for {}: {} ({} bytes)",
            handle.info_hash(),
            info.name,
            info.length
        );
        self.resolved.lock().insert(handle.key(), info);
        Ok(())
    }

    async fn list_payloads(&self, handle: &SourceHandle) -> Result<Vec<PayloadInfo>, SourceError> {
        self.resolved
            .lock()
            .get(&handle.key())
            .map(|info| vec![info.clone()])
            .ok_or_else(|| SourceError::MetadataUnavailable {
                reason: "metadata not resolved yet".to_string(),
            })
    }

    async fn open_reader(
        &self,
        handle: &SourceHandle,
        payload: &PayloadInfo,
    ) -> Result<PayloadReader, SourceError> {
        let is_resolved = self
            .resolved
            .lock()
            .get(&handle.key())
            .is_some_and(|info| info.name == payload.name);
        if !is_resolved {
            return Err(SourceError::PayloadNotFound {
                name: payload.name.clone(),
            });
        }

        let seed = Self::primary_seed(handle)?;
        let response = self
            .client
            .get(seed.clone())
            .send()
            .await?
            .error_for_status()?;

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn release(&self, handle: &SourceHandle) {
        self.resolved.lock().remove(&handle.key());
    }

    fn source_type(&self) -> &'static str {
        "web_seed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_payload_name_prefers_display_name() {
        let magnet = MagnetLink::parse(&format!(
            "magnet:?xt=urn:btih:{HASH}&dn=Feature.mkv&ws=http://seed.example.com/files/other.mkv"
        ))
        .unwrap();
        assert_eq!(payload_name(&magnet, &magnet.web_seeds[0]), "Feature.mkv");
    }

    #[test]
    fn test_payload_name_falls_back_to_path() {
        let magnet = MagnetLink::parse(&format!(
            "magnet:?xt=urn:btih:{HASH}&ws=http://seed.example.com/files/My%20Movie.mkv"
        ))
        .unwrap();
        assert_eq!(payload_name(&magnet, &magnet.web_seeds[0]), "My Movie.mkv");
    }

    #[tokio::test]
    async fn test_accept_requires_web_seed() {
        let source = WebSeedSource::new(Duration::from_secs(1)).unwrap();
        let result = source
            .accept(&format!("magnet:?xt=urn:btih:{HASH}&dn=NoSeeds"))
            .await;
        assert!(matches!(result, Err(SourceError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_list_before_metadata_fails() {
        let source = WebSeedSource::new(Duration::from_secs(1)).unwrap();
        let handle = source
            .accept(&format!(
                "magnet:?xt=urn:btih:{HASH}&ws=http://127.0.0.1:9/movie.mkv"
            ))
            .await
            .unwrap();
        let result = source.list_payloads(&handle).await;
        assert!(matches!(result, Err(SourceError::MetadataUnavailable { .. })));
    }
}
