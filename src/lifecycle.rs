//! Process lifecycle: bind, serve, drain.
//!
//! ```text
//! Starting ──▶ Running ──▶ Draining ──▶ Stopped
//! ```
//!
//! Both shutdown sources (OS signals and fatal accept errors) cancel the
//! same [`CancellationToken`]. Draining stops accepting, asks every open
//! connection to finish gracefully and waits at most the configured drain
//! budget. A connection that moves no bytes for the idle timeout is asked
//! to close the same way.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::ConnectInfo;
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rmcp::service::ServiceExt as _;
use rmcp::transport::stdio;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::auth::AuthPolicy;
use crate::config::{ServerConfig, ServerTimeouts};
use crate::engine::McpEngine;
use crate::error::ServerError;
use crate::server::SseServer;

/// Pause before retrying after a transient accept error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Building the engine and binding the listener.
    Starting,
    /// Accepting connections.
    Running,
    /// No longer accepting, waiting for open connections.
    Draining,
    /// Every connection closed or the drain budget ran out.
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Handle to a server started with [`start`].
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    state: watch::Receiver<LifecycleState>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cancelling this token starts the drain.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Wait until the server has stopped.
    pub async fn wait(self) -> Result<(), ServerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::ListenerRuntime(io::Error::other(e))),
        }
    }
}

/// Build the server, bind the listener and start accepting.
///
/// Every configuration failure is reported here, before any traffic.
pub async fn start(config: ServerConfig) -> Result<RunningServer, ServerError> {
    let (state_tx, state_rx) = watch::channel(LifecycleState::Starting);

    let server = SseServer::new(config.clone())?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|source| ServerError::ListenerBind {
            addr: config.listen_addr.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::ListenerBind {
            addr: config.listen_addr.clone(),
            source,
        })?;

    info!(
        addr = %local_addr,
        sse = %config.sse_path(),
        message = %config.message_path(),
        "SSE server listening"
    );

    let policy = AuthPolicy::from_required(config.require_authentication);
    if policy.is_required() {
        info!("{}", policy.announcement());
    } else {
        warn!("{}", policy.announcement());
    }

    let acceptor = TcpAcceptor {
        listener,
        keepalive: config.timeouts.idle,
    };
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(serve(
        acceptor,
        server,
        config.timeouts,
        shutdown.clone(),
        state_tx,
    ));

    Ok(RunningServer {
        local_addr,
        shutdown,
        state: state_rx,
        task,
    })
}

/// Source of inbound connections for the accept loop.
pub(crate) trait Acceptor: Send {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

struct TcpAcceptor {
    listener: TcpListener,
    keepalive: Duration,
}

impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = configure_tcp_stream(&stream, self.keepalive) {
            warn!(error = %e, peer = %peer, "Failed to configure socket");
        }
        Ok((stream, peer))
    }
}

async fn serve<A: Acceptor>(
    mut acceptor: A,
    server: SseServer,
    timeouts: ServerTimeouts,
    shutdown: CancellationToken,
    state: watch::Sender<LifecycleState>,
) -> Result<(), ServerError> {
    let router = server.router();
    let connections = TaskTracker::new();

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read_header);

    state.send_replace(LifecycleState::Running);

    let mut fatal: Option<io::Error> = None;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }

            accepted = acceptor.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let activity = Arc::new(Activity::new());
                        let io = TokioIo::new(TrackedStream {
                            inner: stream,
                            activity: activity.clone(),
                        });

                        let service = router.clone().map_request(
                            move |mut req: Request<Incoming>| {
                                req.extensions_mut().insert(ConnectInfo(peer));
                                req
                            },
                        );
                        let service = TowerToHyperService::new(service);
                        let conn = builder
                            .serve_connection_with_upgrades(io, service)
                            .into_owned();

                        let shutdown = shutdown.clone();
                        let idle = timeouts.idle;
                        connections.spawn(async move {
                            tokio::pin!(conn);
                            let mut closing = false;

                            loop {
                                tokio::select! {
                                    result = conn.as_mut() => {
                                        if let Err(e) = result {
                                            debug!(
                                                error = %e,
                                                peer = %peer,
                                                "Connection closed with error"
                                            );
                                        }
                                        break;
                                    }
                                    _ = shutdown.cancelled(), if !closing => {
                                        conn.as_mut().graceful_shutdown();
                                        closing = true;
                                    }
                                    _ = activity.idle_for(idle), if !closing => {
                                        debug!(
                                            peer = %peer,
                                            idle = ?idle,
                                            "Closing idle connection"
                                        );
                                        conn.as_mut().graceful_shutdown();
                                        closing = true;
                                    }
                                }
                            }
                        });
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "Transient accept error, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed, shutting down");
                        fatal = Some(e);
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    }

    drop(acceptor);
    state.send_replace(LifecycleState::Draining);
    connections.close();
    info!(
        budget = ?timeouts.drain,
        connections = connections.len(),
        "Draining open connections"
    );

    let drained = tokio::time::timeout(timeouts.drain, connections.wait()).await;
    state.send_replace(LifecycleState::Stopped);

    if let Some(e) = fatal {
        return Err(ServerError::ListenerRuntime(e));
    }
    if drained.is_err() {
        warn!("Drain budget elapsed with connections still open");
        return Err(ServerError::ShutdownDrain {
            budget: timeouts.drain,
        });
    }

    info!("Server stopped");
    Ok(())
}

/// When a connection last moved bytes in either direction.
struct Activity {
    accepted: Instant,
    /// Milliseconds after `accepted`.
    last: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            accepted: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.accepted.elapsed().as_millis() as u64;
        self.last.store(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.accepted + Duration::from_millis(self.last.load(Ordering::Relaxed))
    }

    /// Resolves once no bytes have moved for `idle`.
    async fn idle_for(&self, idle: Duration) {
        loop {
            let deadline = self.last() + idle;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// TCP stream that records its activity.
struct TrackedStream {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if buf.filled().len() > before {
            self.activity.touch();
        }
        poll
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Apply per-connection socket options.
///
/// TCP keep-alive starts after `keepalive` so dead peers holding a
/// long-lived stream are detected.
fn configure_tcp_stream(stream: &TcpStream, keepalive: Duration) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(keepalive);
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Accept errors that say nothing about the listener itself.
fn is_transient_accept_error(err: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(err.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}

/// Cancel `token` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(token: CancellationToken) {
    let sigint_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, initiating graceful shutdown");
                sigint_token.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                token.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });
}

/// Run the SSE server until a signal arrives and the drain completes.
pub async fn run_sse_server(config: ServerConfig) -> Result<(), ServerError> {
    let server = start(config).await?;
    spawn_signal_handler(server.shutdown_token());
    server.wait().await
}

/// Serve MCP over stdin/stdout until the client leaves or a signal arrives.
///
/// There is no gateway in front of stdio, so calls carry no identity.
pub async fn run_stdio_server(config: ServerConfig) -> Result<(), ServerError> {
    let engine = McpEngine::new(&config)?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    info!("MCP server running on stdio");

    let service = engine
        .clone()
        .serve_with_ct(stdio(), shutdown)
        .await
        .map_err(|e| ServerError::StdioSession(e.to_string()))?;
    engine.set_stdio_peer(service.peer().clone()).await;

    let reason = service
        .waiting()
        .await
        .map_err(|e| ServerError::StdioSession(e.to_string()))?;

    info!(reason = ?reason, "stdio server stopped");
    Ok(())
}
