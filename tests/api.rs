use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use health_companion_api::config::Config;
use health_companion_api::store::memory::MemoryStore;
use health_companion_api::{build_router, AppState};

fn app_with(config: Config) -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(config)).unwrap();
    build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

fn app() -> Router {
    app_with(Config::default())
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["access_token"].as_str().unwrap().to_string()
}

fn log_body(title: &str, severity: i32) -> Value {
    json!({
        "title": title,
        "description": format!("{title} since morning"),
        "severity": severity,
        "log_date": "2026-05-14",
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app(), "GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/logs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 401);

    let (status, _) = send(&app, "GET", "/api/profile", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_profile_and_journal_flow() {
    let app = app();
    let token = register(&app, "Pat@Example.com").await;

    let (status, profile) = send(&app, "GET", "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "pat@example.com");
    assert_eq!(profile["personal_history"], "");

    let (status, saved) = send(
        &app,
        "PUT",
        "/api/profile",
        Some(&token),
        Some(json!({ "personal_history": "Asthma" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["status"], "Profile saved successfully!");
    assert_eq!(saved["personal_history"], "Asthma");

    let (status, created) =
        send(&app, "POST", "/api/logs", Some(&token), Some(log_body("Cough", 4))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "Log saved successfully!");
    let id = created["log"]["id"].as_str().unwrap().to_string();

    let mut edit = log_body("Cough", 7);
    edit["id"] = json!(id);
    let (status, updated) = send(&app, "POST", "/api/logs", Some(&token), Some(edit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "Log updated successfully!");
    assert_eq!(updated["log"]["severity"], 7);
    assert_eq!(updated["log"]["created_at"], created["log"]["created_at"]);

    let (status, list) = send(&app, "GET", "/api/logs", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);

    let (_, window) = send(&app, "GET", "/api/logs/window?days=90", Some(&token), None).await;
    assert_eq!(window["count"], 1);

    let (status, grid) = send(
        &app,
        "GET",
        "/api/calendar?year=2026&month=5",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid["month_name"], "May");
    assert_eq!(grid["days"][13]["entry_count"], 1);
}

#[tokio::test]
async fn test_recent_returns_newest_first() {
    let app = app();
    let token = register(&app, "recent@example.com").await;
    for title in ["First", "Second", "Third"] {
        send(&app, "POST", "/api/logs", Some(&token), Some(log_body(title, 3))).await;
    }

    let (status, recent) = send(&app, "GET", "/api/logs/recent?limit=2", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recent["count"], 2);
    assert_eq!(recent["logs"][0]["title"], "Third");
    assert_eq!(recent["logs"][1]["title"], "Second");
}

#[tokio::test]
async fn test_invalid_log_is_rejected_without_writing() {
    let app = app();
    let token = register(&app, "invalid@example.com").await;

    let (status, body) =
        send(&app, "POST", "/api/logs", Some(&token), Some(log_body("Cough", 11))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["message"], "Severity must be between 1 and 10");

    let blank = log_body("   ", 3);
    let (status, _) = send(&app, "POST", "/api/logs", Some(&token), Some(blank)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, list) = send(&app, "GET", "/api/logs", Some(&token), None).await;
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_delete_missing_and_foreign_entries() {
    let app = app();
    let owner = register(&app, "owner@example.com").await;
    let other = register(&app, "other@example.com").await;

    let uri = format!("/api/logs/{}", Uuid::new_v4());
    let (status, body) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Log not found");

    let (_, created) =
        send(&app, "POST", "/api/logs", Some(&owner), Some(log_body("Rash", 5))).await;
    let uri = format!("/api/logs/{}", created["log"]["id"].as_str().unwrap());

    let (status, _) = send(&app, "DELETE", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, deleted) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["status"], "Log deleted successfully!");

    let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_registration_and_bad_login() {
    let app = app();
    register(&app, "dup@example.com").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "dup@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "This email is already in use. Please use a different email or log in."
    );

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "dup@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid username or password");

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "dup@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let (status, body) = send(
        &app(),
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "short@example.com", "password": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["message"],
        "Password must be at least 6 characters long."
    );
}

#[tokio::test]
async fn test_guest_session() {
    let app = app();
    let (status, auth) = send(&app, "POST", "/api/auth/guest", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(auth["is_anonymous"], true);

    let token = auth["access_token"].as_str().unwrap();
    let (status, me) = send(&app, "GET", "/api/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["is_anonymous"], true);
    assert!(me["email"].is_null());
}

#[tokio::test]
async fn test_refresh_rotation_detects_reuse() {
    let app = app();
    let (_, auth) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "rotate@example.com", "password": "secret123" })),
    )
    .await;
    let first = auth["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": first })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = rotated["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": first })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Reuse revoked the whole family.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": second })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited() {
    let app = app();
    let body = json!({ "email": "nobody@example.com", "password": "whatever1" });
    for _ in 0..5 {
        let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_chat_falls_back_on_malformed_model_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let app = app_with(Config {
        gemini_base_url: server.uri(),
        gemini_api_key: "test".into(),
        ..Config::default()
    });
    let token = register(&app, "chat@example.com").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/assistant/chat",
        Some(&token),
        Some(json!({ "question": "Why do I keep coughing?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "fallback");
    assert_eq!(
        body["reply"],
        "Sorry, I'm having trouble connecting right now. Please try again later."
    );
}

#[tokio::test]
async fn test_report_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Patient Health Summary" }] } }]
        })))
        .mount(&server)
        .await;

    let app = app_with(Config {
        gemini_base_url: server.uri(),
        ..Config::default()
    });
    let token = register(&app, "report@example.com").await;

    let (status, body) = send(&app, "POST", "/api/assistant/report", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "gemini");
    assert_eq!(body["report"], "Patient Health Summary");
    assert_eq!(body["status"], "Report generated successfully.");
}

#[tokio::test]
async fn test_report_rejects_body_it_cannot_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Purpose of Visit: knee pain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Patient Health Summary" }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with(Config {
        gemini_base_url: server.uri(),
        ..Config::default()
    });
    let token = register(&app, "purpose@example.com").await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/assistant/report")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "text/plain")
        .body(Body::from(r#"{"visit_purpose":"knee pain"}"#))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/api/assistant/report")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"visit_purpose":"#))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Only the well-formed request reaches the model.
    let (status, body) = send(
        &app,
        "POST",
        "/api/assistant/report",
        Some(&token),
        Some(json!({ "visit_purpose": "knee pain" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "gemini");
}
