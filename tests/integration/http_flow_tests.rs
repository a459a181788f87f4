use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use ai_intervention_agent::models::task::TaskStatus;
use ai_intervention_agent::rendezvous::{RendezvousRegistry, WaitOutcome};

use super::test_helpers::{
    get, post_json, post_multipart, request, send_json, test_router, test_state,
};

#[tokio::test]
async fn health_endpoint_answers() {
    let state = test_state();
    let router = test_router(&state);
    let (status, body) = get(&router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn config_without_task_has_no_content() {
    let state = test_state();
    let router = test_router(&state);
    let (status, body) = get(&router, "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_content"], false);
    assert_eq!(body["project"], "webtest");
    assert!(body["server_time"].is_string());
}

#[tokio::test]
async fn config_reports_active_task_with_countdown_fields() {
    let state = test_state();
    let router = test_router(&state);
    let id = state
        .queue
        .add("Write docs?".into(), vec!["yes".into(), "no".into()], 300)
        .expect("add");

    let (status, body) = get(&router, "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_content"], true);
    assert_eq!(body["task_id"], id.as_str());
    assert_eq!(body["prompt"], "Write docs?");
    assert_eq!(body["predefined_options"][0], "yes");
    assert_eq!(body["auto_resubmit_timeout"], 300);
    assert!(body["deadline"].is_string());
    let remaining = body["remaining_time"].as_i64().expect("remaining_time");
    assert!(remaining > 0 && remaining <= 300);
}

#[tokio::test]
async fn task_listing_includes_stats_and_order() {
    let state = test_state();
    let router = test_router(&state);
    let first = state.queue.add("p1".into(), vec![], 0).expect("add");
    let second = state.queue.add("p2".into(), vec![], 0).expect("add");

    let (status, body) = get(&router, "/api/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let tasks = body["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["task_id"], first.as_str());
    assert_eq!(tasks[1]["task_id"], second.as_str());
    assert_eq!(body["stats"]["active"], 1);
    assert_eq!(body["stats"]["pending"], 1);
}

#[tokio::test]
async fn task_detail_and_unknown_task() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("p1".into(), vec![], 0).expect("add");

    let (status, body) = get(&router, &format!("/api/tasks/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["task_id"], id.as_str());

    let (status, body) = get(&router, "/api/tasks/webtest-9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn explicit_activation_switches_tasks() {
    let state = test_state();
    let router = test_router(&state);
    let first = state.queue.add("p1".into(), vec![], 0).expect("add");
    let second = state.queue.add("p2".into(), vec![], 0).expect("add");

    let (status, body) =
        post_json(&router, &format!("/api/tasks/{second}/activate"), serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    assert_eq!(
        state.queue.get(&first).expect("t").status,
        TaskStatus::Pending
    );
    assert_eq!(
        state.queue.get(&second).expect("t").status,
        TaskStatus::Active
    );
}

#[tokio::test]
async fn submit_to_named_task_wakes_the_waiter() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("q?".into(), vec![], 0).expect("add");
    let rx = state.rendezvous.register(&id).await;

    let (status, body) = post_multipart(
        &router,
        &format!("/api/tasks/{id}/submit"),
        "yes, concise",
        r#"["yes"]"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(1)).await;
    let WaitOutcome::Submitted(result) = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(result.user_input, "yes, concise");
    assert_eq!(result.selected_options, vec!["yes".to_owned()]);

    // Double submit addresses the same task: conflict, no state change.
    let (status, body) = post_multipart(
        &router,
        &format!("/api/tasks/{id}/submit"),
        "again",
        "[]",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(
        state
            .queue
            .get(&id)
            .expect("task")
            .result
            .expect("result")
            .user_input,
        "yes, concise"
    );
}

#[tokio::test]
async fn implicit_submit_addresses_the_active_task_only() {
    let state = test_state();
    let router = test_router(&state);
    let active = state.queue.add("p1".into(), vec![], 0).expect("add");
    let pending = state.queue.add("p2".into(), vec![], 0).expect("add");

    let (status, _) = post_multipart(&router, "/api/submit", "done", "[]", &[]).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        state.queue.get(&active).expect("t").status,
        TaskStatus::Completed
    );
    // The other task was promoted, not completed.
    assert_eq!(
        state.queue.get(&pending).expect("t").status,
        TaskStatus::Active
    );
}

#[tokio::test]
async fn submit_without_active_task_is_not_found() {
    let state = test_state();
    let router = test_router(&state);
    let (status, body) = post_multipart(&router, "/api/submit", "hello", "[]", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn uploaded_image_bytes_survive_intact() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("shot?".into(), vec![], 0).expect("add");

    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(&[7u8, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

    let (status, _) = post_multipart(
        &router,
        &format!("/api/tasks/{id}/submit"),
        "see attached",
        "[]",
        &[("image_0", "shot.png", "image/png", &png)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let result = state.queue.get(&id).expect("task").result.expect("result");
    assert_eq!(result.images.len(), 1);
    assert_eq!(result.images[0].bytes, png);
    assert_eq!(result.images[0].mime, "image/png");
    assert_eq!(result.images[0].filename, "shot.png");
}

#[tokio::test]
async fn invalid_image_parts_are_filtered_not_fatal() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("shot?".into(), vec![], 0).expect("add");

    let (status, _) = post_multipart(
        &router,
        &format!("/api/tasks/{id}/submit"),
        "text still lands",
        "[]",
        &[("image_0", "evil.exe", "application/x-msdownload", b"MZ\x90\x00")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let result = state.queue.get(&id).expect("task").result.expect("result");
    assert!(result.images.is_empty());
    assert_eq!(result.user_input, "text still lands");
}

#[tokio::test]
async fn close_submits_the_canned_text() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("q?".into(), vec![], 0).expect("add");
    let rx = state.rendezvous.register(&id).await;

    let (status, body) = post_json(&router, "/api/close", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(1)).await;
    let WaitOutcome::Submitted(result) = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(result.user_input, "please continue");
}

#[tokio::test]
async fn notification_config_roundtrip_reflects_changes() {
    let state = test_state();
    let router = test_router(&state);

    let (status, body) = get(&router, "/api/get-notification-config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["bark_enabled"], false);

    let (status, body) = post_json(
        &router,
        "/api/update-notification-config",
        serde_json::json!({ "soundMute": true, "barkEnabled": true, "barkDeviceKey": "k1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, body) = get(&router, "/api/get-notification-config").await;
    assert_eq!(body["config"]["sound_mute"], true);
    assert_eq!(body["config"]["bark_enabled"], true);
    assert_eq!(body["config"]["bark_device_key"], "k1");
}

#[tokio::test]
async fn feedback_prompts_endpoint_serves_canned_texts() {
    let state = test_state();
    let router = test_router(&state);
    let (status, body) = get(&router, "/api/get-feedback-prompts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["resubmit_prompt"], "please continue");
    assert_eq!(
        body["config"]["prompt_suffix"],
        "\n\nask again before finishing"
    );
}

#[tokio::test]
async fn test_bark_requires_a_device_key() {
    let state = test_state();
    let router = test_router(&state);
    let (status, body) = post_json(
        &router,
        "/api/test-bark",
        serde_json::json!({ "bark_device_key": "" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn forwarded_public_client_is_blocked() {
    let state = test_state();
    let router = test_router(&state);

    let mut req = request("GET", "/api/tasks", Body::empty());
    req.headers_mut()
        .insert("x-forwarded-for", "8.8.8.8".parse().expect("header"));
    let (status, body) = send_json(&router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn probe_rate_limit_returns_429_with_retry_after() {
    let state = test_state();
    let router = test_router(&state);
    let budget = 6;

    for _ in 0..budget {
        // Empty device key: fails fast with 400 after passing the guard.
        let (status, _) = post_json(
            &router,
            "/api/test-bark",
            serde_json::json!({ "bark_device_key": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let mut req = request(
        "POST",
        "/api/test-bark",
        Body::from(serde_json::json!({ "bark_device_key": "" }).to_string()),
    );
    req.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        "application/json".parse().expect("header"),
    );
    let response = router.clone().oneshot(req).await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .expect("Retry-After header");
    assert!(retry_after >= 1);
}

#[tokio::test]
async fn rate_limited_submit_does_not_mutate_the_queue() {
    let state = test_state();
    let router = test_router(&state);
    let id = state.queue.add("q?".into(), vec![], 0).expect("add");

    // Exhaust the submit budget with conflict-free activations.
    for _ in 0..60 {
        let (_, _) =
            post_json(&router, &format!("/api/tasks/{id}/activate"), serde_json::json!({})).await;
    }
    let (status, _) =
        post_multipart(&router, &format!("/api/tasks/{id}/submit"), "late", "[]", &[]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        state.queue.get(&id).expect("task").status,
        TaskStatus::Active,
        "a limited call must not complete the task"
    );
}

#[tokio::test]
async fn html_shell_carries_security_headers() {
    let state = test_state();
    let router = test_router(&state);

    let response = router
        .clone()
        .oneshot(request("GET", "/", Body::empty()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    let csp = headers
        .get("content-security-policy")
        .and_then(|v| v.to_str().ok())
        .expect("csp present");
    assert!(csp.contains("script-src 'self'"));
    assert!(csp.contains("frame-ancestors 'none'"));
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");

    // JSON responses are not decorated.
    let response = router
        .clone()
        .oneshot(request("GET", "/api/health", Body::empty()))
        .await
        .expect("response");
    assert!(response.headers().get("content-security-policy").is_none());
}
