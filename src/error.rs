//! Process-level failures of the HTTP server.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineError;

/// Errors that stop the server from starting or end it abnormally.
#[derive(Debug)]
pub enum ServerError {
    /// The engine rejected the configuration.
    EngineConstruction(EngineError),
    /// The log file could not be opened for appending.
    LogDestinationOpen { path: PathBuf, source: io::Error },
    /// The listen address could not be bound.
    ListenerBind { addr: String, source: io::Error },
    /// The listener failed with a non-recoverable accept error.
    ListenerRuntime(io::Error),
    /// Connections were still open when the drain budget ran out.
    ShutdownDrain { budget: Duration },
    /// The stdio MCP session could not start or ended abnormally.
    StdioSession(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineConstruction(e) => write!(f, "failed to create MCP engine: {}", e),
            Self::LogDestinationOpen { path, source } => {
                write!(f, "failed to open log file {}: {}", path.display(), source)
            }
            Self::ListenerBind { addr, source } => {
                write!(f, "failed to bind {}: {}", addr, source)
            }
            Self::ListenerRuntime(e) => write!(f, "listener failed: {}", e),
            Self::ShutdownDrain { budget } => {
                write!(f, "connections still open after {:?} shutdown budget", budget)
            }
            Self::StdioSession(reason) => write!(f, "stdio session failed: {}", reason),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EngineConstruction(e) => Some(e),
            Self::LogDestinationOpen { source, .. } | Self::ListenerBind { source, .. } => {
                Some(source)
            }
            Self::ListenerRuntime(e) => Some(e),
            Self::ShutdownDrain { .. } | Self::StdioSession(_) => None,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        Self::EngineConstruction(err)
    }
}
