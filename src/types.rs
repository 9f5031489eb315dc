//! NewType wrappers for strong typing across the gateway layer.
//!
//! Several distinct identifiers travel through a single request (the
//! gateway's user id, the gateway's session id, the MCP transport session
//! id, the gateway correlation id). These wrappers keep them from being
//! swapped by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Subject identifier asserted by the gateway in `X-User-ID`.
    UserId
);

newtype_string!(
    /// Session identifier asserted by the gateway in `X-Session-ID`.
    ///
    /// This is the gateway's own session concept. It is unrelated to the
    /// `SessionId` of an SSE transport session.
    GatewaySessionId
);

newtype_string!(
    /// Correlation identifier the gateway stamps on each forwarded request
    /// (`X-Gateway-Request-ID`).
    GatewayRequestId
);

newtype_string!(
    /// Identifier of an SSE transport session (UUID v4).
    ///
    /// Returned to the client in the `endpoint` event and echoed back in the
    /// `sessionId` query parameter of every message POST.
    SessionId
);

newtype_string!(
    /// Name of a toolset group, e.g. "context" or "repos".
    ToolsetName
);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
