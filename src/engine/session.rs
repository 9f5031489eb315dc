//! SSE session registry.
//!
//! Every session runs its own MCP service on a pair of channels: POSTed
//! client messages go into the inbound channel, and whatever the service
//! sends comes out of the outbound channel onto the client's event stream.
//! Sessions live exactly as long as that stream.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::service::{Peer, RoleServer};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::types::{SessionId, UserId};

/// Messages buffered per direction before senders wait.
const SESSION_BUFFER: usize = 100;

/// What the MCP service runs on: its outbound sink and inbound stream.
pub type SessionTransport = (
    mpsc::Sender<ServerJsonRpcMessage>,
    mpsc::Receiver<ClientJsonRpcMessage>,
);

struct Session {
    inbound: mpsc::Sender<ClientJsonRpcMessage>,
    /// Set once the client has completed initialization.
    peer: Option<Peer<RoleServer>>,
}

/// A session that was just registered.
pub struct OpenedSession {
    pub id: SessionId,
    /// Hand this to the MCP service.
    pub transport: SessionTransport,
    /// Messages the service sends to the client.
    pub outbound: mpsc::Receiver<ServerJsonRpcMessage>,
    /// Cancelled when the guard is dropped.
    pub cancel: CancellationToken,
    pub guard: SessionGuard,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a new event stream.
    ///
    /// The session is removed, and its service cancelled, when the returned
    /// guard is dropped. That happens when the stream holding it is dropped
    /// on disconnect.
    pub fn open(&self, user_id: Option<UserId>) -> OpenedSession {
        let id = SessionId::generate();
        let (inbound_tx, inbound_rx) = mpsc::channel(SESSION_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(SESSION_BUFFER);
        let cancel = CancellationToken::new();

        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id.clone(),
                Session {
                    inbound: inbound_tx,
                    peer: None,
                },
            );

        let guard = SessionGuard {
            id: id.clone(),
            store: self.clone(),
            user_id,
            opened_at: Utc::now(),
            _cancel: cancel.clone().drop_guard(),
        };

        OpenedSession {
            id,
            transport: (outbound_tx, inbound_rx),
            outbound: outbound_rx,
            cancel,
            guard,
        }
    }

    /// Channel feeding client messages to a session, if it is still open.
    pub fn inbound(&self, id: &str) -> Option<mpsc::Sender<ClientJsonRpcMessage>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|s| s.inbound.clone())
    }

    /// Remember the initialized client of a session. Returns `false` if the
    /// session already closed.
    pub fn attach_peer(&self, id: &SessionId, peer: Peer<RoleServer>) -> bool {
        match self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(id)
        {
            Some(session) => {
                session.peer = Some(peer);
                true
            }
            None => false,
        }
    }

    /// Initialized clients of every open session.
    pub fn peers(&self) -> Vec<Peer<RoleServer>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter_map(|s| s.peer.clone())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &SessionId) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

/// Removes its session from the store and cancels its service on drop.
pub struct SessionGuard {
    id: SessionId,
    store: SessionStore,
    /// Who opened the stream, for the close log.
    user_id: Option<UserId>,
    opened_at: DateTime<Utc>,
    _cancel: DropGuard,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.store.remove(&self.id);
        debug!(
            session_id = %self.id,
            user_id = ?self.user_id.as_ref().map(|u| u.as_str()),
            open_secs = (Utc::now() - self.opened_at).num_seconds(),
            "SSE session closed"
        );
    }
}
