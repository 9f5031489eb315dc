//! User context for request-scoped identity.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use http::Extensions;
use http::request::Parts;
use serde::Serialize;

use crate::types::{GatewayRequestId, GatewaySessionId, UserId};

/// Identity asserted by the upstream gateway for one inbound request.
///
/// A `UserContext` only exists fully populated: subject, email and bearer
/// credential are always present. It is immutable once created and is
/// dropped together with the request it was extracted from.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    /// Subject identifier (`X-User-ID`)
    user_id: UserId,
    /// Email address (`X-User-Email`)
    email: String,
    /// Optional display name (`X-User-Name`)
    display_name: Option<String>,
    /// Optional gateway session (`X-Session-ID`)
    session_id: Option<GatewaySessionId>,
    /// Raw bearer credential, forwarded as-is and never validated here
    #[serde(skip)]
    token: String,
    /// Optional gateway correlation id (`X-Gateway-Request-ID`)
    request_id: Option<GatewayRequestId>,
}

impl UserContext {
    /// Create a new user context from the required claims.
    pub fn new(user_id: UserId, email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            display_name: None,
            session_id: None,
            token: token.into(),
            request_id: None,
        }
    }

    /// Set the optional display name.
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Set the optional gateway session id.
    pub fn with_session_id(mut self, session_id: Option<GatewaySessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set the optional gateway correlation id.
    pub fn with_request_id(mut self, request_id: Option<GatewayRequestId>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Get the subject identifier.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Get the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the display name, if the gateway sent one.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Get the gateway session id.
    pub fn session_id(&self) -> Option<&GatewaySessionId> {
        self.session_id.as_ref()
    }

    /// Get the bearer credential as received, without the `Bearer ` prefix.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the gateway correlation id.
    pub fn request_id(&self) -> Option<&GatewayRequestId> {
        self.request_id.as_ref()
    }

    /// Get a display-friendly name for this user.
    pub fn display(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self.email.clone(),
        }
    }
}

// The credential must never end up in logs.
impl std::fmt::Debug for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserContext")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Extension slot holding the attached identity.
///
/// Extensions are keyed by type, and this type is private, so nothing
/// outside this module can insert, replace or shadow the identity.
#[derive(Clone)]
struct Attached(UserContext);

/// Attach an identity to a request's extensions.
pub(crate) fn attach_user_context(extensions: &mut Extensions, user: UserContext) {
    extensions.insert(Attached(user));
}

/// Look up the identity attached to a request.
///
/// `None` is the normal outcome under the optional policy; callers must
/// branch on it rather than treat it as an error.
pub fn user_context(extensions: &Extensions) -> Option<&UserContext> {
    extensions.get::<Attached>().map(|attached| &attached.0)
}

/// Axum extractor yielding the request's identity, if any.
///
/// Never rejects: an unauthenticated request under the optional policy
/// simply produces `CurrentUser(None)`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<UserContext>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(user_context(&parts.extensions).cloned()))
    }
}
