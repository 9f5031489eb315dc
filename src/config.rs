//! Resolved server configuration.
//!
//! The binary builds a [`ServerConfig`] from CLI flags and environment
//! variables; the library only ever sees the resolved structure. It is
//! immutable once the server starts.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Toolset name that enables every known toolset.
pub const ALL_TOOLSETS: &str = "all";

/// Default interval between SSE keep-alive comments.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server version reported by `/status` and `initialize`.
    pub version: String,
    /// API host the tools talk to. Empty means the public default.
    pub host: String,
    /// Static bearer token for the process. May be empty when every request
    /// carries a gateway credential.
    pub token: String,
    pub enabled_toolsets: Vec<String>,
    pub dynamic_toolsets: bool,
    pub read_only: bool,
    pub logging: LoggingOptions,
    /// Address to bind, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,
    /// Externally visible base URL used in the SSE `endpoint` event.
    pub base_url: String,
    /// Path prefix for the MCP routes, e.g. `/mcp`. Empty for none.
    pub base_path: String,
    pub keep_alive: bool,
    #[serde(with = "duration_secs")]
    pub keep_alive_interval: Duration,
    /// Strict (`true`) or optional (`false`) gateway authentication.
    pub require_authentication: bool,
    pub timeouts: ServerTimeouts,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: String::new(),
            token: String::new(),
            enabled_toolsets: vec![ALL_TOOLSETS.to_string()],
            dynamic_toolsets: false,
            read_only: false,
            logging: LoggingOptions::default(),
            listen_addr: "0.0.0.0:8080".to_string(),
            base_url: String::new(),
            base_path: String::new(),
            keep_alive: true,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            require_authentication: true,
            timeouts: ServerTimeouts::default(),
        }
    }
}

impl ServerConfig {
    /// The base path with a leading slash and no trailing slash, or empty.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Route of the SSE session endpoint.
    pub fn sse_path(&self) -> String {
        format!("{}/sse", self.normalized_base_path())
    }

    /// Route of the message endpoint.
    pub fn message_path(&self) -> String {
        format!("{}/message", self.normalized_base_path())
    }

    /// URL advertised to SSE clients for posting messages.
    ///
    /// Absolute when a base URL is configured, path-relative otherwise.
    pub fn message_endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.message_path()
        )
    }
}

/// Logging options for the process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Write logs to this file (append) instead of stderr.
    pub log_file_path: Option<PathBuf>,
    /// Log every tool listing and tool call with its outcome.
    pub enable_command_logging: bool,
    /// Raise the crate's log level to debug.
    pub debug: bool,
}

/// HTTP connection timeouts.
///
/// `read` and `write` bound non-streaming requests only; SSE streams are
/// exempt so they can stay open indefinitely. A connection that moves no
/// bytes for `idle` is asked to close once its in-flight response is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerTimeouts {
    #[serde(with = "duration_secs")]
    pub read: Duration,
    #[serde(with = "duration_secs")]
    pub write: Duration,
    #[serde(with = "duration_secs")]
    pub idle: Duration,
    #[serde(with = "duration_secs")]
    pub read_header: Duration,
    /// Longest shutdown waits for open connections.
    #[serde(with = "duration_secs")]
    pub drain: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            write: Duration::from_secs(30),
            idle: Duration::from_secs(60),
            read_header: Duration::from_secs(10),
            drain: Duration::from_secs(30),
        }
    }
}

impl ServerTimeouts {
    /// Budget for a complete non-streaming request/response exchange.
    pub fn request_budget(&self) -> Duration {
        self.read.max(self.write)
    }
}

/// Parse a comma separated toolset list, trimming blanks.
pub fn parse_toolsets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.require_authentication);
        assert!(config.keep_alive);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
        assert_eq!(config.enabled_toolsets, vec!["all".to_string()]);
        assert_eq!(config.timeouts.read_header, Duration::from_secs(10));
        assert_eq!(config.timeouts.idle, Duration::from_secs(60));
        assert_eq!(config.timeouts.drain, Duration::from_secs(30));
    }

    #[test]
    fn test_paths_without_base() {
        let config = ServerConfig::default();
        assert_eq!(config.sse_path(), "/sse");
        assert_eq!(config.message_path(), "/message");
        assert_eq!(config.message_endpoint_url(), "/message");
    }

    #[test]
    fn test_paths_with_base() {
        let config = ServerConfig {
            base_path: "mcp/".to_string(),
            base_url: "https://gw.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.sse_path(), "/mcp/sse");
        assert_eq!(config.message_path(), "/mcp/message");
        assert_eq!(
            config.message_endpoint_url(),
            "https://gw.example.com/mcp/message"
        );
    }

    #[test]
    fn test_parse_toolsets() {
        assert_eq!(
            parse_toolsets(" repos, issues ,,context"),
            vec!["repos", "issues", "context"]
        );
        assert!(parse_toolsets("").is_empty());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "host": "https://ghe.example.com",
            "read_only": true,
            "keep_alive_interval": 5,
            "timeouts": { "read_header": 3, "drain": 5 }
        }"#;

        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.host, "https://ghe.example.com");
        assert!(config.read_only);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(5));
        assert_eq!(config.timeouts.read_header, Duration::from_secs(3));
        assert_eq!(config.timeouts.read, Duration::from_secs(30));
        assert_eq!(config.timeouts.drain, Duration::from_secs(5));
    }
}
