// Unauthenticated operational endpoints

use axum::{Router, extract::State, http::StatusCode, response::Json, routing::get};
use serde_json::Value;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::McpEngine;

/// Shared state of the HTTP router.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<McpEngine>,
    pub config: Arc<ServerConfig>,
}

/// `/health` and `/status`. These never pass through the authentication gate.
pub fn create_public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn status(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let config = &state.config;

    Ok(Json(serde_json::json!({
        "status": "running",
        "version": config.version,
        "host": config.host,
        "authentication_required": config.require_authentication,
        "read_only": config.read_only,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
