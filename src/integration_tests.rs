//! End-to-end tests of the HTTP surface.
//!
//! Router tests drive the full layer stack with `oneshot`; lifecycle tests
//! bind a real listener and talk to it with `reqwest`.

#![cfg(test)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::config::ServerConfig;
use crate::lifecycle::{LifecycleState, start};
use crate::server::SseServer;

fn strict_router() -> Router {
    SseServer::new(ServerConfig::default()).unwrap().router()
}

fn gateway_request(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", "Bearer gateway-token")
        .header("X-User-ID", "user-123")
        .header("X-User-Email", "user@example.com")
        .header("X-User-Name", "Test User")
        .body(body)
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract the `data:` line of an SSE frame.
fn event_data(frame: &str) -> &str {
    frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap()
}

async fn next_frame(body: &mut Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_and_status_never_gated() {
    for uri in ["/health", "/status"] {
        let anonymous = strict_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK, "{}", uri);

        let with_identity = strict_router()
            .oneshot(gateway_request("GET", uri, Body::empty()))
            .await
            .unwrap();
        assert_eq!(with_identity.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_strict_policy_rejects_sse_without_identity() {
    let response = strict_router()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    let body = body_json(response).await;
    assert_eq!(body["error"], "authentication required");
    assert_eq!(body["message"], "missing Authorization header");
}

#[tokio::test]
async fn test_strict_policy_rejects_missing_email() {
    let request = Request::builder()
        .method("POST")
        .uri("/message?sessionId=abc")
        .header("Authorization", "Bearer gateway-token")
        .header("X-User-ID", "user-123")
        .body(Body::from("{}"))
        .unwrap();

    let response = strict_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "missing required user context headers (X-User-ID or X-User-Email)"
    );
}

#[tokio::test]
async fn test_preflight_answered_on_any_path() {
    for uri in ["/sse", "/message", "/no/such/route"] {
        let response = strict_router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(
            response.headers()["access-control-allow-headers"],
            "Authorization, Content-Type, X-User-ID, X-User-Email, X-User-Name, X-Session-ID, X-Gateway-Request-ID"
        );
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}

/// POST one JSON-RPC message to a session endpoint as the gateway would.
async fn post_message(server: &SseServer, endpoint: &str, message: Value) {
    let accepted = server
        .router()
        .oneshot(gateway_request(
            "POST",
            endpoint,
            Body::from(message.to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
}

async fn next_message(stream: &mut Body) -> Value {
    let frame = next_frame(stream).await;
    assert!(frame.starts_with("event: message\n"), "{}", frame);
    serde_json::from_str(event_data(&frame)).unwrap()
}

/// Open an SSE session and complete the MCP handshake on it.
async fn connect(server: &SseServer) -> (Body, String) {
    let response = server
        .router()
        .oneshot(gateway_request("GET", "/sse", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut stream = response.into_body();

    let endpoint_frame = next_frame(&mut stream).await;
    assert!(endpoint_frame.starts_with("event: endpoint\n"));
    let endpoint = event_data(&endpoint_frame).to_string();
    assert!(endpoint.starts_with("/message?sessionId="));

    post_message(
        server,
        &endpoint,
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0.0"}
            }
        }),
    )
    .await;
    let initialized = next_message(&mut stream).await;
    assert_eq!(initialized["id"], 0);
    assert_eq!(
        initialized["result"]["serverInfo"]["name"],
        "mcp-gateway-server"
    );

    post_message(
        server,
        &endpoint,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;

    (stream, endpoint)
}

#[tokio::test]
async fn test_sse_session_round_trip() {
    let server = SseServer::new(ServerConfig {
        keep_alive: false,
        ..Default::default()
    })
    .unwrap();
    let (mut stream, endpoint) = connect(&server).await;

    post_message(
        &server,
        &endpoint,
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await;
    let message = next_message(&mut stream).await;
    assert_eq!(message["id"], 1);
    assert_eq!(message["result"], json!({}));

    post_message(
        &server,
        &endpoint,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "get_me", "arguments": {}}
        }),
    )
    .await;
    let message = next_message(&mut stream).await;
    assert_eq!(message["id"], 2);
    let text = message["result"]["content"][0]["text"].as_str().unwrap();
    let profile: Value = serde_json::from_str(text).unwrap();
    assert_eq!(profile["user_id"], "user-123");
    assert_eq!(profile["name"], "Test User");
}

#[tokio::test]
async fn test_enabling_toolset_announces_list_change() {
    let server = SseServer::new(ServerConfig {
        keep_alive: false,
        dynamic_toolsets: true,
        enabled_toolsets: Vec::new(),
        ..Default::default()
    })
    .unwrap();
    let (mut stream, endpoint) = connect(&server).await;

    post_message(
        &server,
        &endpoint,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "enable_toolset", "arguments": {"toolset": "context"}}
        }),
    )
    .await;

    let first = next_message(&mut stream).await;
    let second = next_message(&mut stream).await;
    let changed = "notifications/tools/list_changed";
    assert!(first["method"] == changed || second["method"] == changed);
    assert!(first["id"] == 1 || second["id"] == 1);

    post_message(
        &server,
        &endpoint,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await;
    let listed = next_message(&mut stream).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"get_me"));
}

#[tokio::test]
async fn test_strict_policy_accepts_utf8_identity() {
    let request = Request::builder()
        .uri("/sse")
        .header("Authorization", "Bearer gateway-token")
        .header("X-User-ID", "user-123")
        .header(
            "X-User-Email",
            HeaderValue::from_bytes("josé@example.com".as_bytes()).unwrap(),
        )
        .body(Body::empty())
        .unwrap();

    let response = strict_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_open_stream_survives_shutdown_until_client_leaves() {
    let server = start(ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        require_authentication: false,
        keep_alive_interval: Duration::from_millis(200),
        ..Default::default()
    })
    .await
    .unwrap();

    let addr = server.local_addr();
    let token = server.shutdown_token();
    let mut state = server.state();
    state
        .wait_for(|s| *s == LifecycleState::Running)
        .await
        .unwrap();

    let health = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    drop(health);

    let mut stream = reqwest::Client::new()
        .get(format!("http://{}/sse", addr))
        .send()
        .await
        .unwrap();
    let first = stream.chunk().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("event: endpoint"));

    let waiter = tokio::spawn(server.wait());
    token.cancel();
    state
        .wait_for(|s| *s == LifecycleState::Draining)
        .await
        .unwrap();

    let refused = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await;
    assert!(refused.is_err());

    let keep_alive = tokio::time::timeout(Duration::from_secs(5), stream.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!keep_alive.is_empty());
    assert!(!waiter.is_finished());

    drop(stream);

    let result = tokio::time::timeout(Duration::from_secs(10), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(*state.borrow(), LifecycleState::Stopped);
}
