// Integration tests for Backend Gateway
//
// These tests drive the full stack (dispatcher, refresh coordinator,
// transport, upload channel) against mock HTTP backends.

use axum::{extract::Multipart, routing::get, routing::post, Json, Router};
use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backend_gateway::{
    auth::{MemorySlot, SessionState},
    config::Config,
    degraded::DegradedModeSwitch,
    models::Method,
    Gateway, GatewayError, UploadFile,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn test_config(base_url: &str) -> Config {
    Config {
        api_base_url: base_url.trim_end_matches('/').to_string(),
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

/// Gateway with an in-memory credential slot, optionally seeded with a token
fn create_gateway(config: &Config, token: Option<&str>) -> Gateway {
    let slot = match token {
        Some(t) => MemorySlot::with_token(t),
        None => MemorySlot::new(),
    };
    Gateway::with_slot(config, Arc::new(slot), Arc::new(DegradedModeSwitch::new()))
        .expect("Failed to create gateway")
}

/// Serve an axum router on an ephemeral port and return its base URL
async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

/// Base URL nothing is listening on
async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// ==================================================================================================
// Dispatch Tests
// ==================================================================================================

#[tokio::test]
async fn test_get_without_credential_omits_authorization() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/cameras")
        .match_header("authorization", Matcher::Missing)
        .match_header("accept", "application/json")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), None);
    let result = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap();

    assert_eq!(result, json!([]));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_and_retried() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", "/cameras")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/cameras")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"[{"id":1}]"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let result = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap();

    assert_eq!(result, json!([{"id": 1}]));
    assert_eq!(gateway.store.read().await.as_deref(), Some("T2"));
    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn test_second_401_after_refresh_is_hard_failure() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", "/events")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let err = gateway
        .dispatcher
        .request(Method::Get, "/events", None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Status { code: 401, .. }), "got {err:?}");
    // Refresh succeeded, so the renewed token stays
    assert_eq!(gateway.store.read().await.as_deref(), Some("T2"));
    rejected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure_expires_session() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", "/cameras")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let mut session = gateway.store.subscribe();

    let err = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RefreshFailed(_)), "got {err:?}");
    assert_eq!(gateway.store.read().await, None);

    session.changed().await.unwrap();
    assert_eq!(*session.borrow(), SessionState::Expired);
    rejected.assert_async().await;
}

#[tokio::test]
async fn test_non_401_status_propagates_without_refresh() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/cameras/9")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let err = gateway
        .dispatcher
        .request(Method::Delete, "/cameras/9", None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Status { code: 500, .. }));
    assert_eq!(gateway.store.read().await.as_deref(), Some("T1"));
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_401_on_refresh_path_is_not_refreshed() {
    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let err = gateway
        .dispatcher
        .request(Method::Post, "/auth/refresh", None, true)
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(gateway.store.read().await, None);
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_credential_set_is_visible_to_later_calls() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/settings")
        .match_header("authorization", "Bearer T3")
        .with_status(200)
        .with_body(r#"{"theme":"dark"}"#)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    gateway.store.set("T3").await.unwrap();

    let result = gateway
        .dispatcher
        .request(Method::Get, "/settings", None, true)
        .await
        .unwrap();

    assert_eq!(result["theme"], "dark");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_sends_json_body_and_malformed_response_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/cameras")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": "lobby"})))
        .with_status(201)
        .with_body("created")
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), None);
    let result = gateway
        .dispatcher
        .request(Method::Post, "/cameras", Some(json!({"name": "lobby"})), true)
        .await
        .unwrap();

    assert_eq!(result, json!({}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_convenience_wrappers_swallow_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/notifications")
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("PUT", "/notifications/1/read")
        .with_status(200)
        .with_body(r#"{"read":true}"#)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), None);

    assert_eq!(gateway.dispatcher.get("/notifications", true).await, json!({}));
    assert_eq!(
        gateway
            .dispatcher
            .put("/notifications/1/read", json!({}), true)
            .await,
        json!({"read": true})
    );
}

#[tokio::test]
async fn test_unauthenticated_call_skips_stored_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/public")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let result = gateway.dispatcher.get("/public", false).await;

    assert_eq!(result["ok"], true);
    mock.assert_async().await;
}

// ==================================================================================================
// Concurrent Refresh Tests
// ==================================================================================================

async fn concurrent_refresh_count(coalesce: bool, expected_refreshes: usize) {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/cameras/\d$".to_string()))
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"^/cameras/\d$".to_string()))
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"token":"T2"}"#)
        .expect(expected_refreshes)
        .create_async()
        .await;

    let config = Config {
        coalesce_refresh: coalesce,
        ..test_config(&server.url())
    };
    let gateway = create_gateway(&config, Some("T1"));

    let (a, b) = tokio::join!(
        gateway.dispatcher.request(Method::Get, "/cameras/1", None, true),
        gateway.dispatcher.request(Method::Get, "/cameras/2", None, true),
    );

    assert_eq!(a.unwrap()["ok"], true);
    assert_eq!(b.unwrap()["ok"], true);
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_401s_refresh_independently() {
    concurrent_refresh_count(false, 2).await;
}

#[tokio::test]
async fn test_concurrent_401s_coalesce_when_enabled() {
    concurrent_refresh_count(true, 1).await;
}

// ==================================================================================================
// Deadline Tests
// ==================================================================================================

#[tokio::test]
async fn test_slow_backend_times_out_at_deadline() {
    let app = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"late": true}))
        }),
    );
    let base_url = spawn_backend(app).await;

    let config = Config {
        request_timeout: Duration::from_millis(200),
        simulation_allowed: true,
        ..test_config(&base_url)
    };
    let gateway = create_gateway(&config, None);

    let start = Instant::now();
    let err = gateway
        .dispatcher
        .request(Method::Get, "/slow", None, true)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "got {err:?}");
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    // A timeout alone never degrades
    assert!(!gateway.degraded.is_degraded());
}

#[tokio::test]
async fn test_deadline_only_cancels_its_own_call() {
    let app = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        )
        .route(
            "/medium",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Json(json!({"done": true}))
            }),
        );
    let base_url = spawn_backend(app).await;

    let config = Config {
        request_timeout: Duration::from_millis(400),
        ..test_config(&base_url)
    };
    let gateway = create_gateway(&config, None);

    let (slow, medium) = tokio::join!(
        gateway.dispatcher.request(Method::Get, "/slow", None, true),
        gateway.dispatcher.request(Method::Get, "/medium", None, true),
    );

    assert!(slow.unwrap_err().is_timeout());
    assert_eq!(medium.unwrap()["done"], true);
}

// ==================================================================================================
// Degraded Mode Tests
// ==================================================================================================

#[tokio::test]
async fn test_connection_failure_switches_to_simulated_backend() {
    let switch = Arc::new(DegradedModeSwitch::new());

    let config = Config {
        simulation_allowed: true,
        ..test_config(&closed_address().await)
    };
    let gateway = Gateway::with_slot(&config, Arc::new(MemorySlot::new()), switch.clone()).unwrap();

    let start = Instant::now();
    let result = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap();

    assert_eq!(result, json!({"success": true, "message": "Mock API Response"}));
    assert!(switch.is_degraded());
    assert!(start.elapsed() >= Duration::from_millis(300));

    // A later call through any transport sharing the switch stays synthetic
    let mut server = mockito::Server::new_async().await;
    let untouched = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let config = Config {
        simulation_allowed: true,
        ..test_config(&server.url())
    };
    let other = Gateway::with_slot(&config, Arc::new(MemorySlot::new()), switch.clone()).unwrap();

    for _ in 0..3 {
        let result = other.dispatcher.get("/events", true).await;
        assert_eq!(result["message"], "Mock API Response");
    }
    untouched.assert_async().await;
}

#[tokio::test]
async fn test_production_connection_failure_propagates() {
    let config = test_config(&closed_address().await);
    let gateway = create_gateway(&config, None);

    let err = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Transport { .. }), "got {err:?}");
    assert!(!gateway.degraded.is_degraded());
}

// ==================================================================================================
// Upload Tests
// ==================================================================================================

#[tokio::test]
async fn test_upload_reports_progress_to_100() {
    let app = Router::new().route(
        "/events/upload",
        post(|mut multipart: Multipart| async move {
            let mut received = json!({});
            while let Some(field) = multipart.next_field().await.unwrap() {
                let name = field.name().unwrap_or_default().to_string();
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap();
                received = json!({"field": name, "fileName": file_name, "size": bytes.len()});
            }
            Json(received)
        }),
    );
    let base_url = spawn_backend(app).await;
    let gateway = create_gateway(&test_config(&base_url), None);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let file = UploadFile::new("clip.mp4", vec![7u8; 300 * 1024]).with_mime("video/mp4");

    let result = gateway
        .upload
        .upload("/events/upload", file, true, move |p| sink.lock().unwrap().push(p))
        .await
        .unwrap();

    assert_eq!(result["field"], "file");
    assert_eq!(result["fileName"], "clip.mp4");
    assert_eq!(result["size"], 300 * 1024);

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(*seen.last().unwrap(), 100);
}

#[tokio::test]
async fn test_upload_attaches_token_but_never_refreshes() {
    let mut server = mockito::Server::new_async().await;
    let upload = server
        .mock("POST", "/upload")
        .match_header("authorization", "Bearer T1")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data".to_string()),
        )
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), Some("T1"));
    let err = gateway
        .upload
        .upload("/upload", UploadFile::new("a.txt", "hello"), true, |_| {})
        .await
        .unwrap_err();

    assert!(
        matches!(err, GatewayError::Upload { status: 401, ref message } if message == "Unauthorized"),
        "got {err:?}"
    );
    // Upload failures leave credentials alone
    assert_eq!(gateway.store.read().await.as_deref(), Some("T1"));
    upload.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_upload_network_error_is_structured() {
    let gateway = create_gateway(&test_config(&closed_address().await), None);

    let err = gateway
        .upload
        .upload("/upload", UploadFile::new("a.txt", "hello"), true, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Upload { status: 0, ref message } if message == "Network error occurred"
    ));
}

// ==================================================================================================
// Session Tests
// ==================================================================================================

#[tokio::test]
async fn test_login_then_authenticated_call() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_body(r#"{"token":"L1","user":{"username":"admin"}}"#)
        .create_async()
        .await;
    let mock = server
        .mock("GET", "/auth/profile")
        .match_header("authorization", "Bearer L1")
        .with_status(200)
        .with_body(r#"{"username":"admin"}"#)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), None);
    gateway.session.login("admin", "secret").await.unwrap();

    let profile = gateway.dispatcher.get("/auth/profile", true).await;
    assert_eq!(profile["username"], "admin");
    assert_eq!(gateway.store.state(), SessionState::Authenticated);
    mock.assert_async().await;

    gateway.session.logout().await.unwrap();
    assert!(!gateway.session.status().await.is_logged_in);
}

#[tokio::test]
async fn test_login_against_unreachable_backend_does_not_degrade() {
    let config = Config {
        simulation_allowed: true,
        ..test_config(&closed_address().await)
    };
    let gateway = create_gateway(&config, None);

    let err = gateway.session.login("admin", "pw").await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport { .. }), "got {err:?}");
    assert!(!gateway.degraded.is_degraded());
    assert_eq!(gateway.store.read().await, None);
    assert!(!gateway.session.status().await.is_logged_in);
}

#[tokio::test]
async fn test_refresh_replays_session_cookie_from_login() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_header("set-cookie", "refresh=RT1; Path=/")
        .with_body(r#"{"token":"L1","user":{"username":"admin"}}"#)
        .create_async()
        .await;
    let rejected = server
        .mock("GET", "/cameras")
        .match_header("authorization", "Bearer L1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_header("cookie", Matcher::Regex("refresh=RT1".to_string()))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"token":"L2"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/cameras")
        .match_header("authorization", "Bearer L2")
        .with_status(200)
        .with_body("[1]")
        .expect(1)
        .create_async()
        .await;

    let gateway = create_gateway(&test_config(&server.url()), None);
    gateway.session.login("admin", "secret").await.unwrap();

    let result = gateway
        .dispatcher
        .request(Method::Get, "/cameras", None, true)
        .await
        .unwrap();

    assert_eq!(result, json!([1]));
    assert_eq!(gateway.store.read().await.as_deref(), Some("L2"));
    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
}
