//! Gateway header extraction.
//!
//! The upstream gateway has already authenticated the caller; this module
//! only checks that its trust headers are present and well-formed and turns
//! them into a [`UserContext`]. Nothing here verifies the credential.

use std::fmt;

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::auth::context::UserContext;
use crate::types::{GatewayRequestId, GatewaySessionId, UserId};

/// Subject identifier asserted by the gateway (required).
pub const USER_ID_HEADER: &str = "X-User-ID";
/// Email asserted by the gateway (required).
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
/// Display name asserted by the gateway (optional).
pub const USER_NAME_HEADER: &str = "X-User-Name";
/// Gateway session identifier (optional).
pub const SESSION_ID_HEADER: &str = "X-Session-ID";
/// Gateway correlation identifier (optional).
pub const GATEWAY_REQUEST_ID_HEADER: &str = "X-Gateway-Request-ID";

/// Every gateway identity header this module reads, in canonical order.
pub const IDENTITY_HEADERS: [&str; 5] = [
    USER_ID_HEADER,
    USER_EMAIL_HEADER,
    USER_NAME_HEADER,
    SESSION_ID_HEADER,
    GATEWAY_REQUEST_ID_HEADER,
];

const BEARER_PREFIX: &str = "Bearer ";

/// Reasons identity extraction can fail.
///
/// All of these are request-scoped and recoverable: the caller retries with
/// correct headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    MissingCredential,
    /// `Authorization` present but not a `Bearer` credential
    MalformedCredential,
    /// `X-User-ID` or `X-User-Email` missing or empty
    MissingIdentityClaims,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "missing Authorization header"),
            Self::MalformedCredential => write!(f, "invalid Authorization header format"),
            Self::MissingIdentityClaims => write!(
                f,
                "missing required user context headers ({} or {})",
                USER_ID_HEADER, USER_EMAIL_HEADER
            ),
        }
    }
}

impl std::error::Error for AuthError {}

/// Extract the gateway-asserted identity from a request's headers.
///
/// Either every required claim is present and a complete record is
/// returned, or nothing is; there is no partial result.
pub fn extract_user_context(headers: &HeaderMap) -> Result<UserContext, AuthError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential)?;
    let authorization =
        std::str::from_utf8(authorization.as_bytes()).map_err(|_| AuthError::MalformedCredential)?;

    // An empty token after the prefix is accepted; whether it is usable is
    // an authorization concern further downstream.
    let token = authorization
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedCredential)?;

    let user_id = header_value(headers, USER_ID_HEADER);
    let email = header_value(headers, USER_EMAIL_HEADER);
    let (Some(user_id), Some(email)) = (user_id, email) else {
        return Err(AuthError::MissingIdentityClaims);
    };

    let ctx = UserContext::new(UserId::new(user_id), email, token)
        .with_display_name(header_value(headers, USER_NAME_HEADER).map(str::to_string))
        .with_session_id(header_value(headers, SESSION_ID_HEADER).map(GatewaySessionId::new))
        .with_request_id(
            header_value(headers, GATEWAY_REQUEST_ID_HEADER).map(GatewayRequestId::new),
        );

    Ok(ctx)
}

/// Read a header as a non-empty UTF-8 string.
///
/// Names and emails may carry non-ASCII characters, so the raw bytes are
/// decoded as UTF-8. Missing, empty and undecodable values count as absent.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    fn full_headers() -> HeaderMap {
        headers(&[
            ("Authorization", "Bearer abc123"),
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
            (USER_NAME_HEADER, "Octo Cat"),
            (SESSION_ID_HEADER, "gw-session"),
            (GATEWAY_REQUEST_ID_HEADER, "gw-req-1"),
        ])
    }

    #[test]
    fn test_extract_full_identity() {
        let ctx = extract_user_context(&full_headers()).unwrap();

        assert_eq!(ctx.user_id().as_str(), "user-42");
        assert_eq!(ctx.email(), "octo@example.com");
        assert_eq!(ctx.display_name(), Some("Octo Cat"));
        assert_eq!(ctx.session_id().unwrap().as_str(), "gw-session");
        assert_eq!(ctx.request_id().unwrap().as_str(), "gw-req-1");
        assert_eq!(ctx.token(), "abc123");
    }

    #[test]
    fn test_optional_headers_absent() {
        let ctx = extract_user_context(&headers(&[
            ("Authorization", "Bearer abc123"),
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]))
        .unwrap();

        assert_eq!(ctx.display_name(), None);
        assert!(ctx.session_id().is_none());
        assert!(ctx.request_id().is_none());
    }

    #[test]
    fn test_missing_authorization() {
        let result = extract_user_context(&headers(&[
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MissingCredential);
    }

    #[test]
    fn test_wrong_scheme_is_malformed() {
        let result = extract_user_context(&headers(&[
            ("Authorization", "Token abc"),
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MalformedCredential);
    }

    #[test]
    fn test_scheme_is_case_sensitive() {
        let result = extract_user_context(&headers(&[
            ("Authorization", "bearer abc"),
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MalformedCredential);
    }

    #[test]
    fn test_empty_bearer_token_is_accepted() {
        let ctx = extract_user_context(&headers(&[
            ("Authorization", "Bearer "),
            (USER_ID_HEADER, "user-42"),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]))
        .unwrap();
        assert_eq!(ctx.token(), "");
    }

    #[test]
    fn test_missing_email_fails_atomically() {
        let result = extract_user_context(&headers(&[
            ("Authorization", "Bearer abc"),
            (USER_ID_HEADER, "user-42"),
            (USER_NAME_HEADER, "Octo Cat"),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MissingIdentityClaims);
    }

    #[test]
    fn test_empty_user_id_counts_as_missing() {
        let result = extract_user_context(&headers(&[
            ("Authorization", "Bearer abc"),
            (USER_ID_HEADER, ""),
            (USER_EMAIL_HEADER, "octo@example.com"),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MissingIdentityClaims);
    }

    fn raw_headers(pairs: &[(&str, &[u8])]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_bytes(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_utf8_claims_are_kept() {
        let ctx = extract_user_context(&raw_headers(&[
            ("Authorization", "Bearer abc".as_bytes()),
            (USER_ID_HEADER, "usuário-7".as_bytes()),
            (USER_EMAIL_HEADER, "josé@example.com".as_bytes()),
            (USER_NAME_HEADER, "José Müller".as_bytes()),
        ]))
        .unwrap();

        assert_eq!(ctx.user_id().as_str(), "usuário-7");
        assert_eq!(ctx.email(), "josé@example.com");
        assert_eq!(ctx.display_name(), Some("José Müller"));
    }

    #[test]
    fn test_non_ascii_authorization_is_malformed() {
        let result = extract_user_context(&raw_headers(&[
            ("Authorization", "Jéton abc".as_bytes()),
            (USER_ID_HEADER, "user-42".as_bytes()),
            (USER_EMAIL_HEADER, "octo@example.com".as_bytes()),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MalformedCredential);

        let result = extract_user_context(&raw_headers(&[
            ("Authorization", b"Bearer \xff\xfe".as_slice()),
            (USER_ID_HEADER, "user-42".as_bytes()),
            (USER_EMAIL_HEADER, "octo@example.com".as_bytes()),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MalformedCredential);
    }

    #[test]
    fn test_undecodable_claim_counts_as_missing() {
        let result = extract_user_context(&raw_headers(&[
            ("Authorization", "Bearer abc".as_bytes()),
            (USER_ID_HEADER, "user-42".as_bytes()),
            (USER_EMAIL_HEADER, b"\xff@example.com".as_slice()),
        ]));
        assert_eq!(result.unwrap_err(), AuthError::MissingIdentityClaims);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let input = full_headers();
        assert_eq!(extract_user_context(&input), extract_user_context(&input));

        let bad = headers(&[("Authorization", "Token abc")]);
        assert_eq!(extract_user_context(&bad), extract_user_context(&bad));
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::MissingCredential.to_string(),
            "missing Authorization header"
        );
        assert_eq!(
            AuthError::MalformedCredential.to_string(),
            "invalid Authorization header format"
        );
        assert_eq!(
            AuthError::MissingIdentityClaims.to_string(),
            "missing required user context headers (X-User-ID or X-User-Email)"
        );
    }
}
