//! Authentication policy gate.
//!
//! Wraps the MCP routes. Runs the header extractor on every request and,
//! depending on the deployment's [`AuthPolicy`], either rejects requests
//! without a valid gateway identity or lets them through anonymously.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::USER_AGENT;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::context::attach_user_context;
use crate::auth::extractor::{AuthError, extract_user_context};

/// Whether a missing or malformed gateway identity rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Reject with 401 when extraction fails.
    Required,
    /// Continue without an identity when extraction fails.
    Optional,
}

impl AuthPolicy {
    /// Pick the policy for the `authentication required` configuration flag.
    pub fn from_required(required: bool) -> Self {
        if required {
            Self::Required
        } else {
            Self::Optional
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }

    /// Startup line telling operators what the gate will do.
    pub fn announcement(&self) -> &'static str {
        match self {
            Self::Required => "Authentication is required for all operations",
            Self::Optional => "Authentication is optional - some operations may be limited",
        }
    }
}

/// Axum middleware enforcing `policy` on the wrapped routes.
///
/// Install with `axum::middleware::from_fn_with_state(policy, authenticate)`.
/// The identity is attached to the request extensions before the inner
/// handler runs; read it back with [`crate::auth::CurrentUser`].
pub async fn authenticate(
    State(policy): State<AuthPolicy>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    debug!(
        method = %request.method(),
        path = %path,
        remote = ?request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        "Incoming request"
    );

    match (policy, extract_user_context(request.headers())) {
        (AuthPolicy::Required, Err(err)) => {
            let user_agent = request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            warn!(
                error = %err,
                path = %path,
                user_agent = %user_agent,
                "Authentication extraction failed"
            );

            unauthorized(err)
        }
        (AuthPolicy::Optional, Err(err)) => {
            debug!(
                error = %err,
                path = %path,
                "No authentication context, continuing without user context"
            );

            next.run(request).await
        }
        (AuthPolicy::Required, Ok(user)) => {
            info!(
                user_id = %user.user_id(),
                user_email = %user.email(),
                session_id = ?user.session_id().map(|s| s.as_str()),
                request_id = ?user.request_id().map(|r| r.as_str()),
                "Authenticated request"
            );

            attach_user_context(request.extensions_mut(), user);
            next.run(request).await
        }
        (AuthPolicy::Optional, Ok(user)) => {
            debug!(
                user_id = %user.user_id(),
                user_email = %user.email(),
                "Authenticated request"
            );

            attach_user_context(request.extensions_mut(), user);
            next.run(request).await
        }
    }
}

/// The 401 returned under the strict policy.
///
/// The message is the extractor's fixed classification text; no header
/// value is ever echoed back.
fn unauthorized(err: AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "authentication required",
            "message": err.to_string(),
        })),
    )
        .into_response()
}
