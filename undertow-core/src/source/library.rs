//! Local library source for development

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContentSource, MagnetLink, PayloadInfo, PayloadReader, SourceError, SourceHandle};

/// Serves payloads from `<library_dir>/<info_hash>/` instead of a swarm.
///
/// A resource "resolves" once its directory exists, so a developer can drop
/// files in while a stream is already waiting on metadata.
#[derive(Debug, Clone)]
pub struct LibrarySource {
    library_dir: PathBuf,
    poll_interval: Duration,
}

impl LibrarySource {
    pub fn new(library_dir: PathBuf, poll_interval: Duration) -> Self {
        Self {
            library_dir,
            poll_interval,
        }
    }

    /// Directory holding the payloads of one resource.
    pub fn resource_dir(&self, handle: &SourceHandle) -> PathBuf {
        self.library_dir.join(handle.info_hash().to_string())
    }

    fn collect_files<'a>(
        root: &'a Path,
        dir: &'a Path,
        found: &'a mut Vec<PayloadInfo>,
    ) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(dir).await?;
            let mut paths = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                paths.push(entry);
            }
            paths.sort_by_key(|entry| entry.file_name());

            for entry in paths {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if is_ignored(&path) {
                    continue;
                }

                if file_type.is_dir() {
                    if let Err(e) = Self::collect_files(root, &path, found).await {
                        tracing::warn!("Failed to scan {}: {}", path.display(), e);
                    }
                } else if file_type.is_file() {
                    let length = entry.metadata().await?.len();
                    let name = path
                        .strip_prefix(root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    found.push(PayloadInfo::new(name, length));
                }
            }

            Ok(())
        })
    }
}

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            name.starts_with('.') || matches!(name, "Thumbs.db" | "desktop.ini")
        })
}

#[async_trait]
impl ContentSource for LibrarySource {
    async fn accept(&self, descriptor: &str) -> Result<SourceHandle, SourceError> {
        let magnet = MagnetLink::parse(descriptor)?;
        tracing::debug!(
            "Library source accepted {} (looking in {})",
            magnet.info_hash,
            self.library_dir.display()
        );
        Ok(SourceHandle::new(magnet))
    }

    async fn await_metadata(&self, handle: &SourceHandle) -> Result<(), SourceError> {
        let dir = self.resource_dir(handle);
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            match tokio::fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => return Ok(()),
                Ok(_) => {
                    return Err(SourceError::MetadataUnavailable {
                        reason: format!("{} is not a directory", dir.display()),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::trace!("Waiting for library entry {}", dir.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn list_payloads(&self, handle: &SourceHandle) -> Result<Vec<PayloadInfo>, SourceError> {
        let root = self.resource_dir(handle);
        let mut found = Vec::new();
        Self::collect_files(&root, &root, &mut found).await?;
        Ok(found)
    }

    async fn open_reader(
        &self,
        handle: &SourceHandle,
        payload: &PayloadInfo,
    ) -> Result<PayloadReader, SourceError> {
        let root = self.resource_dir(handle);
        let is_listed = self
            .list_payloads(handle)
            .await?
            .iter()
            .any(|candidate| candidate.name == payload.name);
        if !is_listed {
            return Err(SourceError::PayloadNotFound {
                name: payload.name.clone(),
            });
        }

        let file = tokio::fs::File::open(root.join(&payload.name)).await?;
        Ok(Box::new(file))
    }

    async fn release(&self, handle: &SourceHandle) {
        tracing::debug!("Library source released {}", handle.info_hash());
    }

    fn source_type(&self) -> &'static str {
        "library"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn magnet() -> String {
        format!("magnet:?xt=urn:btih:{HASH}&dn=Library%20Test")
    }

    #[tokio::test]
    async fn test_lists_nested_payloads() {
        let temp = tempfile::tempdir().unwrap();
        let resource = temp.path().join(HASH);
        std::fs::create_dir_all(resource.join("extras")).unwrap();
        std::fs::write(resource.join("movie.mkv"), vec![0u8; 5000]).unwrap();
        std::fs::write(resource.join("extras/sample.mkv"), vec![0u8; 100]).unwrap();
        std::fs::write(resource.join(".hidden"), b"x").unwrap();

        let source = LibrarySource::new(temp.path().to_path_buf(), Duration::from_millis(10));
        let handle = source.accept(&magnet()).await.unwrap();
        source.await_metadata(&handle).await.unwrap();

        let payloads = source.list_payloads(&handle).await.unwrap();
        assert_eq!(
            payloads,
            vec![
                PayloadInfo::new("extras/sample.mkv", 100),
                PayloadInfo::new("movie.mkv", 5000),
            ]
        );
    }

    #[tokio::test]
    async fn test_metadata_resolves_when_directory_appears() {
        let temp = tempfile::tempdir().unwrap();
        let source = LibrarySource::new(temp.path().to_path_buf(), Duration::from_millis(10));
        let handle = source.accept(&magnet()).await.unwrap();

        let waiting = tokio::spawn({
            let source = source.clone();
            let handle = handle.clone();
            async move { source.await_metadata(&handle).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        std::fs::create_dir_all(temp.path().join(HASH)).unwrap();
        tokio::time::timeout(Duration::from_secs(2), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_reader_reads_payload() {
        let temp = tempfile::tempdir().unwrap();
        let resource = temp.path().join(HASH);
        std::fs::create_dir_all(&resource).unwrap();
        std::fs::write(resource.join("clip.mp4"), b"payload bytes").unwrap();

        let source = LibrarySource::new(temp.path().to_path_buf(), Duration::from_millis(10));
        let handle = source.accept(&magnet()).await.unwrap();

        let mut reader = source
            .open_reader(&handle, &PayloadInfo::new("clip.mp4", 13))
            .await
            .unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"payload bytes");
    }

    #[tokio::test]
    async fn test_open_reader_refuses_unlisted_names() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(HASH)).unwrap();
        std::fs::write(temp.path().join("outside.mkv"), b"nope").unwrap();

        let source = LibrarySource::new(temp.path().to_path_buf(), Duration::from_millis(10));
        let handle = source.accept(&magnet()).await.unwrap();

        let result = source
            .open_reader(&handle, &PayloadInfo::new("../outside.mkv", 4))
            .await;
        assert!(matches!(result, Err(SourceError::PayloadNotFound { .. })));
    }

    #[tokio::test]
    async fn test_accept_rejects_malformed() {
        let source = LibrarySource::new(PathBuf::from("."), Duration::from_millis(10));
        let result = source.accept("not a magnet").await;
        assert!(matches!(result, Err(SourceError::InvalidDescriptor { .. })));
    }
}
