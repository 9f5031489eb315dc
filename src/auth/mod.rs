//! Gateway identity extraction and the authentication policy gate.
//!
//! This server sits behind a trusted gateway that has already authenticated
//! the caller. The gateway forwards the outcome as headers:
//!
//! - `Authorization: Bearer <credential>` (required, forwarded untouched)
//! - `X-User-ID`, `X-User-Email` (required)
//! - `X-User-Name`, `X-Session-ID`, `X-Gateway-Request-ID` (optional)
//!
//! ## Security Model
//!
//! - Nothing here verifies the credential's authenticity; the gateway owns
//!   that. This layer checks presence and shape only.
//! - The identity is extracted at the HTTP layer before any MCP processing
//!   and handed to tools as an explicit `Option<UserContext>`.
//! - Permission decisions are out of scope.
//!
//! ## Usage
//!
//! ```ignore
//! let mcp_routes = Router::new()
//!     .route("/sse", get(open_session))
//!     .route_layer(from_fn_with_state(AuthPolicy::Required, authenticate));
//!
//! async fn open_session(CurrentUser(user): CurrentUser) { /* ... */ }
//! ```

mod context;
mod extractor;
mod middleware;

pub(crate) use context::attach_user_context;
pub use context::{CurrentUser, UserContext, user_context};
pub use extractor::{
    AuthError, GATEWAY_REQUEST_ID_HEADER, IDENTITY_HEADERS, SESSION_ID_HEADER, USER_EMAIL_HEADER,
    USER_ID_HEADER, USER_NAME_HEADER, extract_user_context,
};
pub use middleware::{AuthPolicy, authenticate};
