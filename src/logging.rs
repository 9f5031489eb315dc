//! Log subscriber construction.
//!
//! Library code only emits `tracing` events. The binary builds the
//! subscriber here once, before anything else runs.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingOptions;
use crate::error::ServerError;

const CRATE_TARGET: &str = "mcp_gateway_server";

/// Whether `LOG_LEVEL=debug` or `DEBUG=true` is set in the environment.
pub fn debug_from_env() -> bool {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_default();
    let debug = std::env::var("DEBUG").unwrap_or_default();
    log_level.eq_ignore_ascii_case("debug") || debug.eq_ignore_ascii_case("true")
}

/// Build the process subscriber.
///
/// Logs go to stderr unless a log file is configured, in which case the file
/// is opened for appending and everything from this crate down to debug is
/// written to it. `RUST_LOG`, when set, replaces the default filter.
pub fn build_subscriber(
    options: &LoggingOptions,
) -> Result<impl Subscriber + Send + Sync + 'static, ServerError> {
    let (writer, level, ansi) = match &options.log_file_path {
        Some(path) => {
            let file = open_log_file(path).map_err(|source| ServerError::LogDestinationOpen {
                path: path.clone(),
                source,
            })?;
            (BoxMakeWriter::new(Arc::new(file)), "debug", false)
        }
        None => {
            let level = if options.debug { "debug" } else { "info" };
            (BoxMakeWriter::new(io::stderr), level, true)
        }
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_ansi(ansi)
        .finish())
}

/// Build and install the subscriber as the global default.
pub fn init(options: &LoggingOptions) -> Result<(), ServerError> {
    let subscriber = build_subscriber(options)?;
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
    Ok(())
}

fn env_filter(level: &str) -> EnvFilter {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::builder().parse_lossy(directives)
        }
        _ => EnvFilter::builder().parse_lossy(format!("warn,{}={},rmcp=warn", CRATE_TARGET, level)),
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
