//! Tool handler registry for managing MCP tool implementations.
//!
//! This module provides a simple way to register and invoke tool handlers,
//! making it easy to add new tools without modifying the engine's dispatch.

mod registry;
pub mod toolsets;

pub use registry::{ToolContext, ToolHandler, ToolRegistry};
pub use toolsets::{ToolsetError, ToolsetSummary, Toolsets};

// Tool handler implementations
mod dynamic;
mod get_me;

pub use dynamic::{EnableToolsetHandler, ListAvailableToolsetsHandler};
pub use get_me::GetMeHandler;

/// Registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new()
        .register_handler(GetMeHandler)
        .register_handler(ListAvailableToolsetsHandler)
        .register_handler(EnableToolsetHandler)
}
