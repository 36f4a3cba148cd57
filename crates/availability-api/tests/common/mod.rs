//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use availability_core::clock::Clock;
use availability_core::context::NoAmbientContext;
use availability_core::repository::DocumentRepository;
use availability_core::retry::RetryPolicy;
use availability_test_support::FixedClock;
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;

use availability_api::routes;
use availability_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over `documents` with a fixed clock. Uses the
/// same route structure as `main.rs`.
pub fn build_test_app(documents: Arc<dyn DocumentRepository>) -> Router {
    build_test_app_with_trigger(documents, Arc::new(Notify::new()))
}

/// Build the full app router, handing commits' wake-ups to `trigger`.
pub fn build_test_app_with_trigger(
    documents: Arc<dyn DocumentRepository>,
    trigger: Arc<Notify>,
) -> Router {
    let app_state = AppState::new(
        fixed_clock(),
        documents,
        RetryPolicy::immediate(3),
        trigger,
        Arc::new(NoAmbientContext),
        "span_context".to_owned(),
    );
    routes::app(app_state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a DELETE request and return the response.
pub async fn delete_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
