//! Dynamic toolset management tools.
//!
//! Only exposed when the server runs with dynamic toolsets enabled.

use std::pin::Pin;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::json;

use crate::tools::toolsets::DYNAMIC_TOOLSET;
use crate::tools::{ToolContext, ToolHandler};

/// Handler for `list_available_toolsets`.
pub struct ListAvailableToolsetsHandler;

impl ToolHandler for ListAvailableToolsetsHandler {
    fn name(&self) -> &str {
        "list_available_toolsets"
    }

    fn description(&self) -> &str {
        "List the toolsets this server offers and whether each is enabled."
    }

    fn toolset(&self) -> &str {
        DYNAMIC_TOOLSET
    }

    fn read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), json!({}));
        schema
    }

    fn execute(
        &self,
        _args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        let summaries = ctx.toolsets.summaries();

        Box::pin(async move {
            let payload = serde_json::to_string(&summaries)?;
            Ok(CallToolResult::success(vec![Content::text(payload)]))
        })
    }
}

/// Handler for `enable_toolset`.
pub struct EnableToolsetHandler;

impl ToolHandler for EnableToolsetHandler {
    fn name(&self) -> &str {
        "enable_toolset"
    }

    fn description(&self) -> &str {
        "Enable one of the available toolsets so its tools appear in tools/list."
    }

    fn toolset(&self) -> &str {
        DYNAMIC_TOOLSET
    }

    // Changes only this server's exposure, never remote state.
    fn read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert(
            "properties".to_string(),
            json!({
                "toolset": {
                    "type": "string",
                    "description": "Name of the toolset to enable.",
                }
            }),
        );
        schema.insert("required".to_string(), json!(["toolset"]));
        schema
    }

    fn execute(
        &self,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        let toolsets = ctx.toolsets.clone();

        Box::pin(async move {
            let name = args
                .get("toolset")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Missing required parameter: toolset"))?;

            let result = match toolsets.enable(name) {
                Ok(true) => {
                    tracing::info!(toolset = %name, "Toolset enabled");
                    CallToolResult::success(vec![Content::text(format!(
                        "Toolset {} enabled",
                        name
                    ))])
                }
                Ok(false) => CallToolResult::success(vec![Content::text(format!(
                    "Toolset {} is already enabled",
                    name
                ))]),
                Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
            };

            Ok(result)
        })
    }
}
