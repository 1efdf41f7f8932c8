//! API Integration Tests
//!
//! Every test runs against the in-memory storage backends.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use prismfit_api::create_router_for_testing;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "Abcdef123";

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn create_authorized_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn years_ago_ms(years: i64) -> i64 {
    (Utc::now() - Duration::days(365 * years + 30)).timestamp_millis()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

async fn register(app: &Router, email: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": email,
                "password": PASSWORD,
                "nickname": "lifter",
                "dateOfBirth": years_ago_ms(30),
            })),
        ),
    )
    .await
}

async fn refresh(app: &Router, refresh_token: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({ "refreshToken": refresh_token })),
        ),
    )
    .await
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["storage_backend"], "memory");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/auth/refresh"].is_object());
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_returns_token_pair() {
    let app = create_router_for_testing();

    let (status, json) = register(&app, "new@example.com").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["accessToken"].is_string());
    assert!(json["refreshToken"].is_string());
    assert_eq!(json["tokenType"], "Bearer");
}

#[tokio::test]
async fn test_register_duplicate_email_conflict() {
    let app = create_router_for_testing();

    let (status, _) = register(&app, "dup@example.com").await;
    assert_eq!(status, StatusCode::OK);

    // Same address in a different case is the same account
    let (status, json) = register(&app, "DUP@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn test_register_underage_rejected() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": "kid@example.com",
                "password": PASSWORD,
                "nickname": "kiddo",
                "dateOfBirth": years_ago_ms(5),
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    // No account was created
    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "kid@example.com", "password": PASSWORD })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_weak_password_rejected() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": "weak@example.com",
                "password": "password",
                "nickname": "lifter",
                "dateOfBirth": years_ago_ms(30),
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().starts_with("password:"));
}

// =============================================================================
// Login Tests
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let app = create_router_for_testing();
    register(&app, "login@example.com").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "  Login@Example.com ", "password": PASSWORD })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["accessToken"].is_string());
}

#[tokio::test]
async fn test_login_unknown_email_not_found() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = create_router_for_testing();
    register(&app, "wrong@example.com").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "wrong@example.com", "password": "Abcdef999" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

// =============================================================================
// Refresh Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "rotate@example.com").await;
    let first = tokens["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = refresh(&app, &first).await;
    assert_eq!(status, StatusCode::OK);
    let second = rotated["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // The consumed token is now a replay
    let (status, _) = refresh(&app, &first).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The rotated token still works
    let (status, _) = refresh(&app, &second).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rejects_access_token_and_garbage() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "types@example.com").await;

    let (status, _) = refresh(&app, tokens["accessToken"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = refresh(&app, "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_refresh_single_winner() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "race@example.com").await;
    let token = tokens["refreshToken"].as_str().unwrap();

    let (a, b) = futures::join!(refresh(&app, token), refresh(&app, token));

    let wins = [a.0, b.0]
        .iter()
        .filter(|status| **status == StatusCode::OK)
        .count();
    assert_eq!(wins, 1);
}

// =============================================================================
// Protected Route Tests
// =============================================================================

#[tokio::test]
async fn test_me_requires_token() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_me_returns_profile_without_password() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "me@example.com").await;
    let access = tokens["accessToken"].as_str().unwrap();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .header("Authorization", format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "me@example.com");
    assert_eq!(json["nickname"], "lifter");
    assert!(json.get("hashedPassword").is_none());
}

#[tokio::test]
async fn test_me_rejects_refresh_token_as_bearer() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "bearer@example.com").await;
    let refresh_token = tokens["refreshToken"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .header("Authorization", format!("Bearer {refresh_token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = create_router_for_testing();
    let (_, tokens) = register(&app, "logout@example.com").await;
    let access = tokens["accessToken"].as_str().unwrap();
    let refresh_token = tokens["refreshToken"].as_str().unwrap();

    let (status, json) = send(
        &app,
        create_authorized_request(
            "POST",
            "/api/v1/auth/logout",
            access,
            json!({ "refreshToken": refresh_token }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessionsRevoked"], 1);

    let (status, _) = refresh(&app, refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_devices() {
    let app = create_router_for_testing();
    let (_, first) = register(&app, "devices@example.com").await;

    let (_, second) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "devices@example.com", "password": PASSWORD })),
        ),
    )
    .await;

    let (status, json) = send(
        &app,
        create_authorized_request(
            "POST",
            "/api/v1/auth/logout",
            first["accessToken"].as_str().unwrap(),
            json!({ "allDevices": true }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessionsRevoked"], 2);

    let (status, _) = refresh(&app, second["refreshToken"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
