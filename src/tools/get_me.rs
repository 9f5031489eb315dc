//! Handler for the `get_me` tool.
//!
//! Reports the gateway identity the calling request carried. Under the
//! optional policy a request may carry none, which is reported as a tool
//! error rather than a protocol error.

use std::pin::Pin;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::json;

use crate::tools::{ToolContext, ToolHandler};

pub struct GetMeHandler;

impl ToolHandler for GetMeHandler {
    fn name(&self) -> &str {
        "get_me"
    }

    fn title(&self) -> Option<&str> {
        Some("Get my user profile")
    }

    fn description(&self) -> &str {
        "Get details of the authenticated user as asserted by the gateway. \
         Use this when a request includes \"me\", \"my\" or similar."
    }

    fn toolset(&self) -> &str {
        "context"
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
        let user = ctx.user_context.clone();

        Box::pin(async move {
            let Some(user) = user else {
                return Ok(CallToolResult::error(vec![Content::text(
                    "no authenticated user: the request carried no gateway identity",
                )]));
            };

            let profile = json!({
                "user_id": user.user_id(),
                "email": user.email(),
                "name": user.display_name(),
                "display": user.display(),
                "session_id": user.session_id(),
                "request_id": user.request_id(),
            });

            Ok(CallToolResult::success(vec![Content::text(
                profile.to_string(),
            )]))
        })
    }
}
