//! Account lifecycle over HTTP: signup, login, refresh rotation, logout.

#![allow(clippy::unwrap_used)]

use amts_integration_tests::TestApp;
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints_respond() {
    let app = TestApp::new();

    let live = app.request(Method::GET, "/api/health", None, None).await;
    assert_eq!(live.status, StatusCode::OK);

    let ready = app.request(Method::GET, "/api/health/ready", None, None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_returns_tokens_and_profile() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let me = app.get("/api/auth/me", &session.access_token).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.str("email"), "grower@example.com");
    assert_eq!(me.str("role"), "user");
    assert_eq!(me.str("subscription_tier"), "free");
    assert!(me.body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_signup_rejects_duplicate_email_in_any_case() {
    let app = TestApp::new();
    app.signup("grower@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "Grower@Example.com", "password": "correct-horse-9"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signup_rejects_malformed_body() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "grower@example.com"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.get("error").is_some());
}

#[tokio::test]
async fn test_login_checks_password() {
    let app = TestApp::new();
    app.signup("grower@example.com").await;

    let ok = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "grower@example.com", "password": "correct-horse-9"})),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(!ok.str("access_token").is_empty());
    assert_eq!(ok.str("token_type"), "bearer");

    let wrong = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "grower@example.com", "password": "wrong-horse-9"})),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_a_bearer_token() {
    let app = TestApp::new();

    let missing = app.request(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let garbage = app.get("/api/auth/me", "not-a-jwt").await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_cannot_be_used_as_access_token() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let response = app.get("/api/auth/me", &session.refresh_token).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_the_previous_token() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let first = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": session.refresh_token})),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    let rotated = first.str("refresh_token").to_string();
    assert_ne!(rotated, session.refresh_token);

    let replay = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": session.refresh_token})),
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let next = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": rotated})),
        )
        .await;
    assert_eq!(next.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_the_refresh_token() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let logout = app
        .request(
            Method::POST,
            "/api/auth/logout",
            Some(&session.access_token),
            None,
        )
        .await;
    assert_eq!(logout.status, StatusCode::OK);

    let refresh = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": session.refresh_token})),
        )
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_update_cannot_change_role() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let response = app
        .request(
            Method::PUT,
            "/api/auth/me",
            Some(&session.access_token),
            Some(json!({"company_name": "Green Leaf Co", "role": "super_admin"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.str("company_name"), "Green Leaf Co");
    assert_eq!(response.str("role"), "user");
}

#[tokio::test]
async fn test_responses_carry_a_request_id() {
    let app = TestApp::new();
    let response = app.request(Method::GET, "/api/health", None, None).await;
    assert!(response.headers.contains_key("x-request-id"));
}
