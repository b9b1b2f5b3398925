//! REST surface tests
//!
//! Drive the full router in-process with `oneshot`, backed by the memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use ara_chat_service::chat::MemoryChatStore;
use ara_chat_service::config::{
    ChatConfig, DatabaseConfig, JwtConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig,
};
use ara_chat_service::server::{create_app, AppState};

fn test_settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: "api-integration-secret".to_string(),
            issuer: None,
            audience: None,
            expiration_days: 1,
        },
        websocket: WebSocketConfig::default(),
        database: DatabaseConfig::default(),
        chat: ChatConfig {
            default_page_size: 2,
            max_page_size: 3,
        },
        otel: OtelConfig::default(),
    }
}

fn test_app() -> (Router, AppState) {
    let state = AppState::new(test_settings(), Arc::new(MemoryChatStore::new()));
    (create_app(state.clone()), state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Register a user and sign in, returning (user id, token)
async fn signed_in_user(app: &Router, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/v0.1.0/users",
        None,
        Some(json!({
            "firstName": "Test",
            "lastName": "User",
            "email": email,
            "password": "secret-pw",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    let user_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        "/v0.1.0/auth",
        None,
        Some(json!({ "email": email, "password": "secret-pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "sign in failed: {body}");
    let token = body["data"]["token"].as_str().unwrap().to_string();

    (user_id, token)
}

async fn create_room(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/v0.1.0/chat/rooms",
        Some(token),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Users and sign-in
// =============================================================================

#[tokio::test]
async fn test_register_and_fetch_profile() {
    let (app, _) = test_app();
    let (user_id, token) = signed_in_user(&app, "Ada@Example.com").await;

    let (status, body) = send(&app, Method::GET, "/v0.1.0/users/me", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["data"]["id"], user_id);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["firstName"], "Test");
    assert!(body["data"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_requires_params() {
    let (app, _) = test_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v0.1.0/users",
        None,
        Some(json!({ "lastName": "User", "email": "a@b.co", "password": "secret" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"], "Param firstName is required.");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let (app, _) = test_app();
    signed_in_user(&app, "dup@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v0.1.0/users",
        None,
        Some(json!({
            "firstName": "Other",
            "lastName": "User",
            "email": "dup@example.com",
            "password": "another-pw",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "user/email-already-in-use");
}

#[tokio::test]
async fn test_sign_in_failures() {
    let (app, _) = test_app();
    signed_in_user(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v0.1.0/auth",
        None,
        Some(json!({ "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing credentials");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v0.1.0/auth",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong-pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _) = test_app();

    let (status, body) = send(&app, Method::GET, "/v0.1.0/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = send(&app, Method::GET, "/v0.1.0/chat/rooms", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Rooms and messages
// =============================================================================

#[tokio::test]
async fn test_room_message_flow() {
    let (app, _) = test_app();
    let (user_id, token) = signed_in_user(&app, "owner@example.com").await;
    let room_id = create_room(&app, &token, "general").await;

    let (status, body) = send(&app, Method::GET, "/v0.1.0/chat/rooms", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["members"][0]["id"], user_id);

    for text in ["first", "second", "third"] {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/v0.1.0/chat/rooms/{room_id}/messages"),
            Some(&token),
            Some(json!({ "message": text })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], text);
        assert_eq!(body["data"]["user"]["id"], user_id);
    }

    // Default page size is 2, newest first
    let uri = format!("/v0.1.0/chat/rooms/{room_id}/messages");
    let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"], "third");
    assert_eq!(messages[1]["message"], "second");

    let uri = format!("/v0.1.0/chat/rooms/{room_id}/messages?skip=2&limit=10");
    let (_, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "first");

    // Non-integer paging values fall back to the defaults
    let uri = format!("/v0.1.0/chat/rooms/{room_id}/messages?skip=x&limit=abc");
    let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"], "third");
}

#[tokio::test]
async fn test_non_member_access() {
    let (app, _) = test_app();
    let (_, owner_token) = signed_in_user(&app, "owner@example.com").await;
    let (_, other_token) = signed_in_user(&app, "other@example.com").await;
    let room_id = create_room(&app, &owner_token, "private").await;

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v0.1.0/chat/rooms/{room_id}"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/v0.1.0/chat/rooms/{room_id}/messages"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_membership_changes() {
    let (app, _) = test_app();
    let (_, owner_token) = signed_in_user(&app, "owner@example.com").await;
    let (guest_id, guest_token) = signed_in_user(&app, "guest@example.com").await;
    let room_id = create_room(&app, &owner_token, "team").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/v0.1.0/chat/rooms/{room_id}/members"),
        Some(&owner_token),
        Some(json!({ "userId": guest_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v0.1.0/chat/rooms/{room_id}"),
        Some(&guest_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/v0.1.0/chat/rooms/{room_id}/members/{guest_id}"),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_ids_and_unknown_routes() {
    let (app, _) = test_app();
    let (_, token) = signed_in_user(&app, "ada@example.com").await;

    let (status, body) = send(&app, Method::GET, "/v0.1.0/chat/rooms/42", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid id format");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v0.1.0/chat/rooms/{missing}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": 404, "message": "Not Found" }));
}

// =============================================================================
// Operational endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_stats() {
    let (app, _) = test_app();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["backend"], "memory");
    assert_eq!(body["connections"]["total"], 0);

    let (status, body) = send(&app, Method::GET, "/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fanout"]["total_deliveries"], 0);
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ara_chat_"));
}

#[tokio::test]
async fn test_cors_headers_on_responses() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
