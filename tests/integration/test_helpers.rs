//! Shared test helpers for HTTP-level integration tests.
//!
//! Builds a complete `AppState` without touching the disk or the network,
//! plus request plumbing for driving the router in-process.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use ai_intervention_agent::api::build_router;
use ai_intervention_agent::api::security::RateLimiter;
use ai_intervention_agent::config::{CliOverrides, ConfigStore};
use ai_intervention_agent::mcp::handler::AppState;
use ai_intervention_agent::notification::NotificationDispatcher;
use ai_intervention_agent::queue::{TaskQueue, DEFAULT_MAX_TASKS};
use ai_intervention_agent::rendezvous::RendezvousRegistry;
use ai_intervention_agent::scheduler::ResubmitScheduler;

/// Config used by the HTTP tests: access control on with the default
/// private-network allow-list, short canned texts.
pub const TEST_CONFIG: &str = r#"{
    "web_ui": { "host": "127.0.0.1", "port": 8080 },
    "feedback": {
        "timeout": 600,
        "resubmit_prompt": "please continue",
        "prompt_suffix": "\n\nask again before finishing"
    }
}"#;

/// Build a complete `AppState` backed by a config file in a temp
/// directory, so the write-back path works in tests too.
pub fn test_state() -> Arc<AppState> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.jsonc");
    std::fs::write(&path, TEST_CONFIG).expect("write test config");
    // Keep the directory for the whole test process.
    std::mem::forget(dir);
    let config =
        Arc::new(ConfigStore::open(Some(path), CliOverrides::default()).expect("test config"));
    let queue = Arc::new(TaskQueue::new("webtest", DEFAULT_MAX_TASKS));
    let rendezvous = Arc::new(RendezvousRegistry::new());
    let scheduler = Arc::new(ResubmitScheduler::new(
        Arc::clone(&queue),
        Arc::clone(&rendezvous),
        Arc::clone(&config),
    ));
    let (notifier, _runtime) = NotificationDispatcher::start(Arc::clone(&config));
    Arc::new(AppState {
        config,
        queue,
        rendezvous,
        scheduler,
        notifier,
        limiter: RateLimiter::new(),
    })
}

/// Router over a fresh test state.
pub fn test_router(state: &Arc<AppState>) -> Router {
    build_router(Arc::clone(state))
}

/// Request with the peer-address extension the guard middleware expects.
pub fn request(method: &str, path: &str, body: Body) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .body(body)
        .expect("request");
    let peer: SocketAddr = "127.0.0.1:40000".parse().expect("peer");
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

/// Fire one request and return `(status, parsed JSON body)`.
pub async fn send_json(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(req).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

/// Convenience GET.
pub async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    send_json(router, request("GET", path, Body::empty())).await
}

/// Convenience JSON POST.
pub async fn post_json(
    router: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut req = request("POST", path, Body::from(body.to_string()));
    req.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        "application/json".parse().expect("header"),
    );
    send_json(router, req).await
}

pub const BOUNDARY: &str = "test-boundary-7f93";

/// Build a `multipart/form-data` submission body.
pub fn multipart_body(
    feedback_text: &str,
    selected_options_json: &str,
    images: &[(&str, &str, &str, &[u8])],
) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let mut push_text = |name: &str, value: &str| {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    };
    push_text("feedback_text", feedback_text);
    push_text("selected_options", selected_options_json);
    for (name, filename, mime, bytes) in images {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

/// POST a multipart submission.
pub async fn post_multipart(
    router: &Router,
    path: &str,
    feedback_text: &str,
    selected_options_json: &str,
    images: &[(&str, &str, &str, &[u8])],
) -> (StatusCode, serde_json::Value) {
    let (content_type, body) = multipart_body(feedback_text, selected_options_json, images);
    let mut req = request("POST", path, Body::from(body));
    req.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        content_type.parse().expect("header"),
    );
    send_json(router, req).await
}
