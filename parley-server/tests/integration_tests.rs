//! End-to-end tests over the assembled router, without a database.
//!
//! The API surface must authenticate and shape its errors correctly even
//! when the pool is absent; database-backed behavior is covered by the
//! service and engine tests.

use std::sync::Arc;

use axum_test::TestServer;
use http::StatusCode;
use http::header::COOKIE;
use serde_json::Value;
use uuid::Uuid;

use server::server::{create_app_router, create_app_state, metrics_handle};
use shared::config::server::{Config, Profile};

fn test_server() -> TestServer {
    let state = create_app_state(None);
    let config = Arc::new(Config::default_for_profile(Profile::Test));
    let app = create_app_router(state, config, metrics_handle());
    TestServer::new(app).expect("test server")
}

#[tokio::test]
async fn healthz_is_always_ok() {
    let server = test_server();
    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn readyz_degrades_without_a_database() {
    let server = test_server();
    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn api_rejects_requests_without_a_session() {
    let server = test_server();
    let response = server.get("/api/chat/conversations").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.header("content-type"), "application/problem+json");

    let body: Value = response.json();
    assert_eq!(body["code"], "unauthenticated");
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn api_rejects_malformed_session_cookies() {
    let server = test_server();
    let response = server
        .get("/api/chat/conversations")
        .add_header(COOKIE, "parley_session=garbage")
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_api_reports_missing_database_as_unavailable() {
    let server = test_server();
    let response = server
        .get("/api/chat/conversations")
        .add_header(COOKIE, format!("parley_session={}", Uuid::new_v4()))
        .await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["code"], "database_unavailable");
}

#[tokio::test]
async fn malformed_create_body_is_a_bad_request_problem() {
    let server = test_server();
    let response = server
        .post("/api/chat/create")
        .add_header(COOKIE, format!("parley_session={}", Uuid::new_v4()))
        .json(&serde_json::json!({ "participant_id": "not-a-uuid" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.header("content-type"), "application/problem+json");

    let body: Value = response.json();
    assert_eq!(body["code"], "invalid_argument");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn responses_echo_the_request_id() {
    let server = test_server();

    let response = server
        .get("/healthz")
        .add_header("x-request-id", "trace-me-42")
        .await;
    assert_eq!(response.header("x-request-id"), "trace-me-42");

    // Without a client-supplied id the server generates one.
    let response = server.get("/healthz").await;
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let server = test_server();
    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), "text/plain; version=0.0.4");
}
