//! MCP server over HTTP with server-sent events.
//!
//! A client opens `GET <base>/sse` and receives an `endpoint` event naming the
//! URL to POST its JSON-RPC messages to. Responses come back as `message`
//! events on the same stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::SinkExt;
use futures::channel::mpsc;
use futures::stream::{self, Stream, StreamExt};
use rmcp::ErrorData as McpError;
use rmcp::model::*;
use serde::Deserialize;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::api::{AppState, create_public_router};
use crate::auth::{AuthPolicy, CurrentUser, authenticate};
use crate::config::ServerConfig;
use crate::cors::cors;
use crate::engine::{EngineError, McpEngine, SessionGuard};
use crate::types::SessionId;

/// Largest message body accepted on the message route.
const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// The HTTP face of the engine: router plus shared state.
#[derive(Clone)]
pub struct SseServer {
    state: AppState,
}

impl SseServer {
    /// Build the engine from `config` and wrap it.
    pub fn new(config: ServerConfig) -> Result<Self, EngineError> {
        let engine = McpEngine::new(&config)?;
        Ok(Self::with_engine(config, engine))
    }

    pub fn with_engine(config: ServerConfig, engine: McpEngine) -> Self {
        Self {
            state: AppState {
                engine: Arc::new(engine),
                config: Arc::new(config),
            },
        }
    }

    pub fn engine(&self) -> &Arc<McpEngine> {
        &self.state.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// The complete router, ready to serve.
    ///
    /// Layer order, outermost first: CORS, tracing, then the authentication
    /// gate on the MCP routes only. `/health` and `/status` stay open.
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let policy = AuthPolicy::from_required(config.require_authentication);

        let mcp_routes = Router::new()
            .route(&config.sse_path(), get(sse_handler))
            .route(
                &config.message_path(),
                post(message_handler).layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.timeouts.request_budget(),
                )),
            )
            .route_layer(from_fn_with_state(policy, authenticate));

        Router::new()
            .merge(create_public_router())
            .merge(mcp_routes)
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(cors))
            .with_state(self.state.clone())
    }
}

async fn sse_handler(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Response {
    let (session_id, outbound, guard) = state.engine.open_session(user.as_ref());
    let endpoint = format!(
        "{}?sessionId={}",
        state.config.message_endpoint_url(),
        session_id
    );

    info!(
        session_id = %session_id,
        user_id = ?user.as_ref().map(|u| u.user_id().as_str()),
        "SSE session opened"
    );

    let stream = session_stream(endpoint, outbound, guard);
    let sse = Sse::new(stream);

    if state.config.keep_alive {
        sse.keep_alive(KeepAlive::new().interval(state.config.keep_alive_interval))
            .into_response()
    } else {
        sse.into_response()
    }
}

/// The `endpoint` event followed by every message the session's service sends.
///
/// The guard rides along in the stream state, so the session disappears
/// from the store as soon as the client goes away.
fn session_stream(
    endpoint: String,
    outbound: mpsc::Receiver<ServerJsonRpcMessage>,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let first = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });

    let messages = stream::unfold((outbound, guard), |(mut outbound, guard)| async move {
        loop {
            let message = outbound.next().await?;
            match serde_json::to_string(&message) {
                Ok(payload) => {
                    let event = Event::default().event("message").data(payload);
                    return Some((Ok::<_, Infallible>(event), (outbound, guard)));
                }
                Err(e) => error!(error = %e, "Failed to serialize MCP message"),
            }
        }
    });

    first.chain(messages)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Hand one client message to its session's service and answer 202.
///
/// The response, if any, arrives on the event stream. The request parts,
/// carrying the identity the gate attached, travel with the message.
async fn message_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    request: Request,
) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return bad_request(ErrorCode::INVALID_REQUEST, "Missing sessionId");
    };

    let Some(mut inbound) = state.engine.sessions().inbound(&session_id) else {
        debug!(session_id = %session_id, "Message for unknown session");
        return bad_request(ErrorCode::INVALID_REQUEST, "Invalid session ID");
    };

    let (mut parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_MESSAGE_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return bad_request(ErrorCode::PARSE_ERROR, &format!("Failed to read body: {}", e));
        }
    };
    let mut message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => return bad_request(ErrorCode::PARSE_ERROR, &format!("Parse error: {}", e)),
    };

    parts.extensions.insert(SessionId::new(session_id.as_str()));
    match &mut message {
        ClientJsonRpcMessage::Request(request) => {
            request.request.extensions_mut().insert(parts);
        }
        ClientJsonRpcMessage::Notification(notification) => {
            notification.notification.extensions_mut().insert(parts);
        }
        _ => {}
    }

    if inbound.send(message).await.is_err() {
        debug!(session_id = %session_id, "Session closed before the message was delivered");
        return bad_request(ErrorCode::INVALID_REQUEST, "Invalid session ID");
    }

    StatusCode::ACCEPTED.into_response()
}

fn bad_request(code: ErrorCode, message: &str) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": McpError::new(code, message.to_string(), None),
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
