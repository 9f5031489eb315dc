// Core modules
pub mod config;
mod error;
pub mod logging;
pub mod types;

// Gateway trust boundary
pub mod auth;
mod cors;

// MCP engine and tools
pub mod engine;
pub mod tools;

// HTTP surface
pub mod api;
pub mod lifecycle;
pub mod server;

#[cfg(test)]
mod integration_tests;

// Re-export key types and functions
pub use auth::{AuthPolicy, CurrentUser, UserContext};
pub use config::{LoggingOptions, ServerConfig, ServerTimeouts};
pub use engine::{EngineError, McpEngine};
pub use error::ServerError;
pub use lifecycle::{
    LifecycleState, RunningServer, run_sse_server, run_stdio_server, start,
};
pub use server::SseServer;
pub use tools::{ToolHandler, ToolRegistry};
