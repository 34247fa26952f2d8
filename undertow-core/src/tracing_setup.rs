//! Tracing setup for Undertow
//!
//! Two sinks share one registry. The terminal gets what the operator asked
//! for; `undertow-last-run.log` gets everything down to trace, transcoder
//! diagnostics included, and is truncated at every start.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run debug log inside the logs directory.
pub const LAST_RUN_LOG: &str = "undertow-last-run.log";

const DEFAULT_LOGS_DIR: &str = "logs";

/// HTTP plumbing is noisy below these levels.
const QUIET_CONSOLE_CRATES: &str = "hyper=warn,hyper_util=warn,reqwest=warn";
const QUIET_FILE_CRATES: &str = "hyper=info,hyper_util=info,reqwest=debug";

/// Installs the global subscriber.
///
/// A set `RUST_LOG` replaces the console filter entirely. The run log lands
/// in `logs_dir`, or `./logs` when none is given.
///
/// # Errors
///
/// Fails when the logs directory or the run log cannot be created.
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<(), std::io::Error> {
    let run_log = last_run_log_path(logs_dir);
    if let Some(parent) = run_log.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = File::create(&run_log)?;

    let terminal = fmt::layer()
        .compact()
        .with_filter(console_filter(console_level));

    let run_file = fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .with_filter(EnvFilter::new(format!("trace,{QUIET_FILE_CRATES}")));

    tracing_subscriber::registry()
        .with(terminal)
        .with(run_file)
        .init();

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        run_log.display()
    );
    Ok(())
}

/// Where [`init_tracing`] writes the run log.
pub fn last_run_log_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir
        .unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR))
        .join(LAST_RUN_LOG)
}

fn console_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_CONSOLE_CRATES}")))
}

/// `--log-level` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes every transcoder diagnostic line
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        self.into()
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.to_possible_value().ok_or(std::fmt::Error)?;
        f.write_str(value.get_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_defaults_to_local_logs_dir() {
        assert_eq!(
            last_run_log_path(None),
            Path::new("logs").join("undertow-last-run.log")
        );
        let custom = Path::new("/var/log/undertow");
        assert_eq!(last_run_log_path(Some(custom)), custom.join(LAST_RUN_LOG));
    }

    #[test]
    fn test_cli_levels_map_onto_tracing_levels() {
        assert_eq!(CliLogLevel::Warn.as_tracing_level(), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_cli_level_display_matches_flag_value() {
        for level in CliLogLevel::value_variants() {
            let shown = level.to_string();
            assert_eq!(CliLogLevel::from_str(&shown, false), Ok(*level));
            assert!(EnvFilter::try_new(&shown).is_ok());
        }
    }
}
