//! API tests driving the router in-process.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use keyseed_server::routes;
use keyseed_server::state::AppState;

fn app() -> Router {
    routes::router(Arc::new(AppState::in_memory("kv-test")))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

struct Tokens {
    writer: String,
    reader: String,
}

async fn init(app: &Router) -> Tokens {
    let (status, body) = send(app, Method::POST, "/v1/sys/init", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    Tokens {
        writer: body["writer_token"].as_str().unwrap().to_owned(),
        reader: body["reader_token"].as_str().unwrap().to_owned(),
    }
}

#[tokio::test]
async fn health_reports_initialisation() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/v1/sys/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initialized"], false);

    init(&app).await;
    let (_, body) = send(&app, Method::GET, "/v1/sys/health", None, None).await;
    assert_eq!(body["initialized"], true);
}

#[tokio::test]
async fn init_only_once() {
    let app = app();
    let tokens = init(&app).await;
    assert_ne!(tokens.writer, tokens.reader);

    let (status, body) = send(&app, Method::POST, "/v1/sys/init", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn secrets_require_a_credential() {
    let app = app();
    init(&app).await;

    let (status, body) = send(&app, Method::GET, "/v1/secrets/admin-token", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(
        &app,
        Method::GET,
        "/v1/secrets/admin-token",
        Some("not-a-credential"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn writer_writes_and_reader_reads() {
    let app = app();
    let t = init(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/secrets/db-password/exists",
        Some(&t.writer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], false);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v1/secrets/db-password",
        Some(&t.writer),
        Some(json!({ "value": "S3cur3Pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &app,
        Method::GET,
        "/v1/secrets/db-password/exists",
        Some(&t.writer),
        None,
    )
    .await;
    assert_eq!(body["exists"], true);

    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/secrets/db-password",
        Some(&t.reader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], "S3cur3Pass");
}

#[tokio::test]
async fn roles_cannot_cross() {
    let app = app();
    let t = init(&app).await;
    send(
        &app,
        Method::PUT,
        "/v1/secrets/admin-token",
        Some(&t.writer),
        Some(json!({ "value": "original" })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/v1/secrets/admin-token",
        Some(&t.reader),
        Some(json!({ "value": "evil" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.to_string().contains("evil"));

    let (status, _) = send(
        &app,
        Method::GET,
        "/v1/secrets/admin-token/exists",
        Some(&t.reader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/secrets/admin-token",
        Some(&t.writer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.to_string().contains("original"));

    let (_, body) = send(
        &app,
        Method::GET,
        "/v1/secrets/admin-token",
        Some(&t.reader),
        None,
    )
    .await;
    assert_eq!(body["value"], "original");
}

#[tokio::test]
async fn missing_secret_is_404_and_bad_name_is_400() {
    let app = app();
    let t = init(&app).await;

    let (status, body) = send(&app, Method::GET, "/v1/secrets/nope", Some(&t.reader), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        &app,
        Method::GET,
        "/v1/secrets/bad_name",
        Some(&t.reader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v1/secrets/empty",
        Some(&t.writer),
        Some(json!({ "value": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_lists_names_without_values() {
    let app = app();
    let t = init(&app).await;
    send(
        &app,
        Method::PUT,
        "/v1/secrets/admin-token",
        Some(&t.writer),
        Some(json!({ "value": "tok-value" })),
    )
    .await;

    let (status, _) = send(&app, Method::GET, "/v1/sys/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, "/v1/sys/status", Some(&t.reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initialized"], true);
    assert_eq!(body["scope"], "kv-test");
    assert_eq!(body["secrets"], json!(["admin-token"]));
    assert_eq!(body["bindings"].as_array().unwrap().len(), 2);
    assert!(!body.to_string().contains("tok-value"));
}

#[tokio::test]
async fn requests_before_init_are_unavailable() {
    let app = app();
    let fake = "6f1c2a9e-4b7d-4c1e-9a3f-2d5e8b7c1a40.token";
    let (status, body) = send(&app, Method::GET, "/v1/secrets/a", Some(fake), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "not_initialized");
}

#[tokio::test]
async fn responses_carry_hardening_headers() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/sys/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let headers = resp.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}
