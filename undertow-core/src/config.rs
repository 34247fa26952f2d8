//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcoder: TranscoderConfig,
    pub source: SourceConfig,
    pub streams: StreamsConfig,
    pub search: SearchConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,
    /// Externally visible base URL used when building playlist links
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Base URL for absolute playlist links, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen_addr),
        }
    }
}

/// Working directory and disk I/O configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Parent of the process-private base directory (None = system temp dir)
    pub work_root: Option<PathBuf>,
    /// Buffer size used when piping payload bytes into the transcoder
    pub copy_buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_root: None,
            copy_buffer_size: 65536, // 64 KiB
        }
    }
}

/// External transcoder invocation settings.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// FFmpeg binary path
    pub ffmpeg_path: PathBuf,
    /// Video codec passed to `-c:v`
    pub video_codec: String,
    /// Audio codec passed to `-c:a`
    pub audio_codec: String,
    /// Target segment duration in seconds
    pub segment_seconds: u32,
    /// Playlist file name written into each working directory
    pub playlist_name: String,
    /// Numbered segment file pattern
    pub segment_pattern: String,
    /// How long shutdown waits for pipelines to wind down
    pub shutdown_grace: Duration,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            segment_seconds: 10,
            playlist_name: "playlist.m3u8".to_string(),
            segment_pattern: "segment%03d.ts".to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Content source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Client data directory, created at startup
    pub data_dir: PathBuf,
    /// Root of the local library used in development mode
    pub library_dir: PathBuf,
    /// How often a pending metadata lookup is re-checked
    pub metadata_poll_interval: Duration,
    /// Timeout for web seed metadata requests
    pub http_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            library_dir: PathBuf::from("./library"),
            metadata_poll_interval: Duration::from_millis(500),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Stream lifecycle limits.
#[derive(Debug, Clone)]
pub struct StreamsConfig {
    /// Maximum number of pipelines doing work at the same time
    pub max_concurrent_pipelines: usize,
    /// Terminal streams older than this are evicted (None = keep until shutdown)
    pub stream_ttl: Option<Duration>,
    /// Interval between eviction sweeps
    pub sweep_interval: Duration,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 4,
            stream_ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Metadata search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// OMDb API key (None = search unavailable in production mode)
    pub omdb_api_key: Option<String>,
    /// OMDb endpoint
    pub omdb_base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            omdb_api_key: None,
            omdb_base_url: "http://www.omdbapi.com/".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("UNDERTOW_LISTEN_ADDR")
            && let Ok(addr) = addr.parse::<SocketAddr>()
        {
            config.server.listen_addr = addr;
        }

        if let Ok(url) = std::env::var("UNDERTOW_PUBLIC_URL")
            && !url.is_empty()
        {
            config.server.public_base_url = Some(url);
        }

        if let Ok(root) = std::env::var("UNDERTOW_WORK_ROOT") {
            config.storage.work_root = Some(PathBuf::from(root));
        }

        if let Ok(path) = std::env::var("UNDERTOW_FFMPEG_PATH") {
            config.transcoder.ffmpeg_path = PathBuf::from(path);
        }

        if let Ok(seconds) = std::env::var("UNDERTOW_SEGMENT_SECONDS")
            && let Ok(seconds) = seconds.parse::<u32>()
        {
            config.transcoder.segment_seconds = seconds;
        }

        if let Ok(dir) = std::env::var("UNDERTOW_DATA_DIR") {
            config.source.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("UNDERTOW_LIBRARY_DIR") {
            config.source.library_dir = PathBuf::from(dir);
        }

        if let Ok(max) = std::env::var("UNDERTOW_MAX_PIPELINES")
            && let Ok(count) = max.parse::<usize>()
        {
            config.streams.max_concurrent_pipelines = count.max(1);
        }

        if let Ok(ttl) = std::env::var("UNDERTOW_STREAM_TTL")
            && let Ok(seconds) = ttl.parse::<u64>()
        {
            config.streams.stream_ttl = Some(Duration::from_secs(seconds));
        }

        if let Ok(key) = std::env::var("OMDB_API_KEY")
            && !key.is_empty()
        {
            config.search.omdb_api_key = Some(key);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.source.metadata_poll_interval = Duration::from_millis(10);
        config.transcoder.shutdown_grace = Duration::from_secs(2);
        config.streams.sweep_interval = Duration::from_millis(50);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.storage.copy_buffer_size, 65536);
        assert_eq!(config.transcoder.playlist_name, "playlist.m3u8");
        assert_eq!(config.transcoder.segment_pattern, "segment%03d.ts");
        assert_eq!(config.transcoder.segment_seconds, 10);
        assert_eq!(config.streams.max_concurrent_pipelines, 4);
        assert!(config.streams.stream_ttl.is_none());
        assert!(config.search.omdb_api_key.is_none());
    }

    #[test]
    fn test_base_url() {
        let mut server = ServerConfig::default();
        assert_eq!(server.base_url(), "http://127.0.0.1:8080");

        server.public_base_url = Some("https://media.example.com/".to_string());
        assert_eq!(server.base_url(), "https://media.example.com");
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("UNDERTOW_LISTEN_ADDR", "0.0.0.0:9000");
            std::env::set_var("UNDERTOW_MAX_PIPELINES", "0");
            std::env::set_var("UNDERTOW_STREAM_TTL", "120");
            std::env::set_var("UNDERTOW_SEGMENT_SECONDS", "6");
        }

        let config = UndertowConfig::from_env();

        assert_eq!(config.server.listen_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.streams.max_concurrent_pipelines, 1);
        assert_eq!(config.streams.stream_ttl, Some(Duration::from_secs(120)));
        assert_eq!(config.transcoder.segment_seconds, 6);

        // Cleanup
        unsafe {
            std::env::remove_var("UNDERTOW_LISTEN_ADDR");
            std::env::remove_var("UNDERTOW_MAX_PIPELINES");
            std::env::remove_var("UNDERTOW_STREAM_TTL");
            std::env::remove_var("UNDERTOW_SEGMENT_SECONDS");
        }
    }
}
