//! MCP tool-invocation engine.
//!
//! [`McpEngine`] is the rmcp [`ServerHandler`] behind both transports. Over
//! SSE every session runs its own service on a channel transport (see
//! [`McpEngine::open_session`]); over stdio one service runs on the process
//! streams. The caller's identity rides in the request extensions as the
//! HTTP request parts of the POST that carried the message, and is never
//! stored between requests.

mod session;

pub use session::{OpenedSession, SessionGuard, SessionStore, SessionTransport};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::mpsc;
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{Peer, RequestContext, RoleServer, ServiceExt},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{UserContext, user_context};
use crate::config::ServerConfig;
use crate::tools::{
    ToolContext, ToolHandler, ToolRegistry, ToolsetError, Toolsets, default_registry,
};
use crate::types::SessionId;

/// HTTP request parts of the POST that delivered a client message.
///
/// The SSE transport stores them in the rmcp request extensions; the
/// gateway identity is attached to their own extensions.
pub type HttpParts = http::request::Parts;

const DOTCOM_API: &str = "https://api.github.com/";

/// Errors constructing the engine from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An enabled toolset is not provided by any registered tool.
    UnknownToolset(String),
    /// The configured API host is not a usable URL.
    InvalidHost { host: String, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownToolset(name) => write!(f, "toolset {} does not exist", name),
            Self::InvalidHost { host, reason } => {
                write!(f, "invalid API host {:?}: {}", host, reason)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ToolsetError> for EngineError {
    fn from(err: ToolsetError) -> Self {
        match err {
            ToolsetError::Unknown(name) => Self::UnknownToolset(name),
        }
    }
}

/// Who is calling, and over which session.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    pub user: Option<UserContext>,
    pub session_id: Option<SessionId>,
}

impl CallScope {
    /// Read the scope from the HTTP parts a transport stored, if any.
    fn from_parts(parts: Option<&HttpParts>) -> Self {
        Self {
            user: parts.and_then(|p| user_context(&p.extensions)).cloned(),
            session_id: parts.and_then(|p| p.extensions.get::<SessionId>()).cloned(),
        }
    }
}

#[derive(Clone)]
pub struct McpEngine {
    version: String,
    api_base: Url,
    read_only: bool,
    command_logging: bool,
    registry: Arc<ToolRegistry>,
    toolsets: Arc<Toolsets>,
    sessions: SessionStore,
    /// Client of the stdio service, for notifications.
    stdio_peer: Arc<RwLock<Option<Peer<RoleServer>>>>,
}

impl McpEngine {
    /// Build the engine with the built-in tools.
    pub fn new(config: &ServerConfig) -> Result<Self, EngineError> {
        Self::with_registry(config, default_registry())
    }

    /// Build the engine with a caller-supplied tool registry.
    pub fn with_registry(
        config: &ServerConfig,
        registry: ToolRegistry,
    ) -> Result<Self, EngineError> {
        let api_base = resolve_api_base(&config.host)?;
        let toolsets =
            Toolsets::new(&registry, &config.enabled_toolsets, config.dynamic_toolsets)?;

        Ok(Self {
            version: config.version.clone(),
            api_base,
            read_only: config.read_only,
            command_logging: config.logging.enable_command_logging,
            registry: Arc::new(registry),
            toolsets: Arc::new(toolsets),
            sessions: SessionStore::new(),
            stdio_peer: Arc::new(RwLock::new(None)),
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn toolsets(&self) -> &Arc<Toolsets> {
        &self.toolsets
    }

    /// Open an SSE session and start its MCP service.
    ///
    /// Returns the session id, the messages the service sends to the client
    /// and the guard that closes the session when dropped.
    pub fn open_session(
        &self,
        user: Option<&UserContext>,
    ) -> (SessionId, mpsc::Receiver<ServerJsonRpcMessage>, SessionGuard) {
        let OpenedSession {
            id,
            transport,
            outbound,
            cancel,
            guard,
        } = self.sessions.open(user.map(|u| u.user_id().clone()));

        let engine = self.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            let service = match engine.clone().serve_with_ct(transport, cancel).await {
                Ok(service) => service,
                Err(e) => {
                    debug!(
                        session_id = %session_id,
                        error = %e,
                        "MCP session ended before initialization"
                    );
                    return;
                }
            };

            engine
                .sessions
                .attach_peer(&session_id, service.peer().clone());
            debug!(session_id = %session_id, "MCP session initialized");

            if let Err(e) = service.waiting().await {
                warn!(session_id = %session_id, error = %e, "MCP session task failed");
            }
        });

        (id, outbound, guard)
    }

    /// Remember the client of the stdio service.
    pub async fn set_stdio_peer(&self, peer: Peer<RoleServer>) {
        *self.stdio_peer.write().await = Some(peer);
    }

    /// Tell every initialized client that `tools/list` changed.
    pub async fn notify_tool_list_changed(&self) {
        let mut peers = self.sessions.peers();
        if let Some(peer) = self.stdio_peer.read().await.clone() {
            peers.push(peer);
        }

        debug!(clients = peers.len(), "Sending tools/list_changed");
        for peer in peers {
            if let Err(e) = peer.notify_tool_list_changed().await {
                debug!(error = %e, "Client went away before tools/list_changed");
            }
        }
    }

    /// Tools currently visible to clients, in name order.
    pub fn tools(&self) -> Vec<Tool> {
        self.exposed_tools()
            .map(|handler| handler.to_mcp_tool())
            .collect()
    }

    /// Run one tool on behalf of `scope`.
    ///
    /// Hidden and unknown tools are both `invalid_params`. A tool that
    /// changed the exposed tool set triggers `tools/list_changed`.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: JsonObject,
        scope: CallScope,
    ) -> Result<CallToolResult, McpError> {
        if self.command_logging {
            info!(
                tool = %name,
                arguments = ?arguments,
                user_id = ?scope.user.as_ref().map(|u| u.user_id().as_str()),
                session_id = ?scope.session_id.as_ref().map(|s| s.as_str()),
                "MCP tool call"
            );
        }

        let handler = self
            .registry
            .get(name)
            .filter(|h| self.is_exposed(h.as_ref()))
            .ok_or_else(|| McpError::invalid_params(format!("Tool not found: {}", name), None))?;

        let ctx = ToolContext {
            user_context: scope.user,
            session_id: scope.session_id,
            toolsets: self.toolsets.clone(),
        };

        let revision = self.toolsets.revision();
        let result = handler.execute(arguments, &ctx).await.map_err(|e| {
            McpError::internal_error(format!("Tool execution failed: {}", e), None)
        })?;

        if self.command_logging {
            info!(tool = %name, is_error = ?result.is_error, "MCP tool result");
        }

        if self.toolsets.revision() != revision {
            self.notify_tool_list_changed().await;
        }

        Ok(result)
    }

    fn exposed_tools(&self) -> impl Iterator<Item = &Arc<dyn ToolHandler>> {
        self.registry
            .handlers()
            .filter(|handler| self.is_exposed(handler.as_ref()))
    }

    fn is_exposed(&self, handler: &dyn ToolHandler) -> bool {
        if self.read_only && !handler.read_only() {
            return false;
        }
        self.toolsets.is_enabled(handler.toolset())
    }
}

impl ServerHandler for McpEngine {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name = env!("CARGO_PKG_NAME").to_string();
        server_info.version = self.version.clone();

        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info,
            instructions: Some(
                "Tool server behind an identity gateway. Tools act on behalf of the user \
                 asserted by the gateway; call get_me to see who that is."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.tools();
        if self.command_logging {
            info!(count = tools.len(), "MCP tools/list");
        }

        std::future::ready(Ok(ListToolsResult {
            tools,
            next_cursor: None,
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let name = request.name.to_string();
        let arguments = request.arguments.unwrap_or_default();
        let scope = CallScope::from_parts(context.extensions.get::<HttpParts>());

        async move { self.invoke(&name, arguments, scope).await }
    }
}

/// Map the configured host onto the REST API base URL.
///
/// Empty or `github.com` means the public API; anything else is treated as
/// an Enterprise Server install serving its API under `/api/v3/`.
fn resolve_api_base(host: &str) -> Result<Url, EngineError> {
    let invalid = |reason: String| EngineError::InvalidHost {
        host: host.to_string(),
        reason,
    };

    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Url::parse(DOTCOM_API).map_err(|e| invalid(e.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    let hostname = url
        .host_str()
        .ok_or_else(|| invalid("missing hostname".to_string()))?;

    if hostname == "github.com" || hostname == "api.github.com" {
        return Url::parse(DOTCOM_API).map_err(|e| invalid(e.to_string()));
    }

    url.join("/api/v3/").map_err(|e| invalid(e.to_string()))
}
