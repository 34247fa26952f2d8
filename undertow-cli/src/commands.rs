//! CLI command implementations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use undertow_core::source::{MagnetLink, source_for_mode};
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};
use undertow_core::{
    FfmpegTranscoder, RuntimeMode, StreamOrchestrator, UndertowConfig, UndertowError,
};
use undertow_search::MediaSearchService;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Server {
        /// Address to bind to (overrides UNDERTOW_LISTEN_ADDR)
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Runtime mode (production or development)
        #[arg(long, default_value = "development")]
        mode: RuntimeMode,

        /// Data directory created at startup
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Library of payloads keyed by info hash (development mode only)
        #[arg(long)]
        library_dir: Option<PathBuf>,

        /// Console log level
        #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
        log_level: CliLogLevel,

        /// Directory for the full trace log
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },

    /// Parse a magnet link and print what it describes
    Inspect {
        /// Magnet link
        magnet: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of the command that ran
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            addr,
            mode,
            data_dir,
            library_dir,
            log_level,
            logs_dir,
        } => {
            let mut config = UndertowConfig::from_env();
            if let Some(addr) = addr {
                config.server.listen_addr = addr;
            }
            if let Some(dir) = data_dir {
                config.source.data_dir = dir;
            }
            if let Some(dir) = library_dir {
                config.source.library_dir = dir;
            }
            init_tracing(log_level.as_tracing_level(), logs_dir.as_deref())
                .context("failed to initialize logging")?;
            start_server(config, mode).await
        }
        Commands::Inspect { magnet } => inspect_magnet(&magnet),
    }
}

/// Wires the source, transcoder, orchestrator and search, then serves.
///
/// # Errors
/// - Data directory could not be created
/// - Source, orchestrator or search setup failed
/// - The HTTP server failed
pub async fn start_server(config: UndertowConfig, mode: RuntimeMode) -> anyhow::Result<()> {
    tracing::info!("Starting Undertow in {} mode", mode);

    tokio::fs::create_dir_all(&config.source.data_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create data directory {}",
                config.source.data_dir.display()
            )
        })?;

    let source = source_for_mode(mode, &config).context("failed to set up content source")?;

    let transcoder = FfmpegTranscoder::new(
        config.transcoder.clone(),
        config.storage.copy_buffer_size,
    );
    match transcoder.probe().await {
        Ok(version) => tracing::info!("Using {}", version),
        Err(e) => tracing::warn!("ffmpeg probe failed, streams will fail to transcode: {}", e),
    }

    let orchestrator = StreamOrchestrator::start(&config, source, Arc::new(transcoder))
        .context("failed to start stream orchestrator")?;
    let search = MediaSearchService::from_runtime_mode(mode, &config.search)
        .context("failed to set up media search")?;

    undertow_web::run_server(&config, orchestrator, search)
        .await
        .context("HTTP server failed")
}

/// Prints the parts of a magnet link.
///
/// # Errors
/// - The link is not a valid magnet link
pub fn inspect_magnet(magnet: &str) -> anyhow::Result<()> {
    let link = MagnetLink::parse(magnet)
        .map_err(|e| anyhow::anyhow!(UndertowError::from(e).user_message()))?;

    println!("Info hash:  {}", link.info_hash);
    println!(
        "Name:       {}",
        link.display_name.as_deref().unwrap_or("(none)")
    );
    if let Some(length) = link.exact_length {
        println!("Length:     {length} bytes");
    }
    println!("Trackers:   {}", link.trackers.len());
    for tracker in &link.trackers {
        println!("  {tracker}");
    }
    println!("Web seeds:  {}", link.web_seeds.len());
    for seed in &link.web_seeds {
        println!("  {seed}");
    }
    if link.web_seeds.is_empty() {
        println!("Note: no web seed, production mode will reject this link");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_server_flags_parse() {
        let cli = TestCli::try_parse_from([
            "undertow",
            "server",
            "--addr",
            "0.0.0.0:9000",
            "--mode",
            "production",
            "--log-level",
            "debug",
        ])
        .unwrap();

        match cli.command {
            Commands::Server {
                addr,
                mode,
                log_level,
                ..
            } => {
                assert_eq!(addr.unwrap().port(), 9000);
                assert_eq!(mode, RuntimeMode::Production);
                assert_eq!(log_level, CliLogLevel::Debug);
            }
            Commands::Inspect { .. } => panic!("expected server command"),
        }
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect_magnet("http://example.com").is_err());
        assert!(
            inspect_magnet("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567").is_ok()
        );
    }
}
