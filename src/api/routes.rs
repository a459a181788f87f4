//! REST handlers over the queue, config store, and notification system.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::NotificationUpdate;
use crate::images::validate_image;
use crate::mcp::handler::AppState;
use crate::models::task::{FeedbackResult, Task, TaskOutcome};
use crate::notification::bark::{BarkParams, BarkTransport};
use crate::queue::server_time;
use crate::AppError;

/// Uniform error envelope: status code carries the class, the body always
/// has `status` and `message` for programmatic use.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

fn app_error_response(err: &AppError) -> Response {
    let status = match err {
        AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::Blocked(_) => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

/// Listing row for one task, with the server-authoritative clock fields
/// clients need to render drift-free countdowns.
#[derive(Debug, Serialize)]
struct TaskRow {
    task_id: String,
    prompt: String,
    predefined_options: Vec<String>,
    status: crate::models::task::TaskStatus,
    auto_resubmit_timeout: u64,
    created_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    remaining_time: Option<i64>,
}

impl TaskRow {
    fn from_task(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id.clone(),
            prompt: task.prompt.clone(),
            predefined_options: task.predefined_options.clone(),
            status: task.status,
            auto_resubmit_timeout: task.auto_resubmit_timeout,
            created_at: task.created_at,
            deadline: task.deadline,
            remaining_time: task.remaining_seconds(now),
        }
    }
}

/// `GET /api/config` — what the UI needs to render the active task.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Response {
    let now = server_time();
    match state.queue.active() {
        Some(task) => {
            let remaining = task.remaining_seconds(now);
            Json(json!({
                "has_content": true,
                "task_id": task.id,
                "prompt": task.prompt,
                "predefined_options": task.predefined_options,
                "project": state.queue.project(),
                "auto_resubmit_timeout": task.auto_resubmit_timeout,
                "server_time": now,
                "deadline": task.deadline,
                "remaining_time": remaining,
            }))
            .into_response()
        }
        None => Json(json!({
            "has_content": false,
            "project": state.queue.project(),
            "server_time": now,
        }))
        .into_response(),
    }
}

/// `GET /api/tasks` — ordered listing plus stats.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Response {
    let now = server_time();
    let tasks: Vec<TaskRow> = state
        .queue
        .list()
        .iter()
        .map(|task| TaskRow::from_task(task, now))
        .collect();
    Json(json!({
        "success": true,
        "tasks": tasks,
        "stats": state.queue.stats(),
        "server_time": now,
    }))
    .into_response()
}

/// `GET /api/tasks/{id}` — full detail of one task.
pub async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let now = server_time();
    match state.queue.get(&id) {
        Some(task) => Json(json!({
            "success": true,
            "task": TaskRow::from_task(&task, now),
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, &format!("no such task: {id}")),
    }
}

/// `POST /api/tasks/{id}/activate` — explicit activation.
pub async fn activate_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.queue.activate(&id) {
        Ok(()) => Json(json!({ "success": true, "status": "success", "message": "task activated" }))
            .into_response(),
        Err(err) => app_error_response(&err),
    }
}

/// `POST /api/submit` — submit for the currently active task.
pub async fn submit_active(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let Some(task) = state.queue.active() else {
        return error_response(StatusCode::NOT_FOUND, "no active task");
    };
    submit_inner(&state, &task.id, multipart).await
}

/// `POST /api/tasks/{id}/submit` — submit addressing one task explicitly,
/// immune to active-task races.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    submit_inner(&state, &id, multipart).await
}

async fn submit_inner(state: &Arc<AppState>, task_id: &str, multipart: Multipart) -> Response {
    let result = match ingest_submission(multipart).await {
        Ok(result) => result,
        Err(err) => return app_error_response(&err),
    };
    match complete_task(state, task_id, result).await {
        Ok(()) => Json(json!({
            "success": true,
            "status": "success",
            "message": "feedback submitted",
        }))
        .into_response(),
        Err(err) => app_error_response(&err),
    }
}

/// `POST /api/close` — orderly cancel of the current task, shaped as a
/// submission carrying the canned text so the blocked RPC still receives
/// a well-formed reply sequence.
pub async fn close_task(State(state): State<Arc<AppState>>) -> Response {
    let Some(task) = state.queue.active() else {
        return error_response(StatusCode::NOT_FOUND, "no active task");
    };
    let canned = state.config.snapshot().feedback.resubmit_prompt.clone();
    match complete_task(&state, &task.id, FeedbackResult::text(canned)).await {
        Ok(()) => Json(json!({
            "success": true,
            "status": "success",
            "message": "task closed",
        }))
        .into_response(),
        Err(err) => app_error_response(&err),
    }
}

/// Record a submission and wake the RPC waiter. The queue arbitrates
/// double submits; the rendezvous delivery only happens when the queue
/// accepted, so an observer that sees `completed` knows the waiter is
/// woken or already gone.
pub async fn complete_task(
    state: &Arc<AppState>,
    task_id: &str,
    result: FeedbackResult,
) -> crate::Result<()> {
    let stored = state.queue.submit(task_id, result)?;
    state.scheduler.disarm(task_id).await;
    state
        .rendezvous
        .deliver(task_id, TaskOutcome::Submitted(stored))
        .await;
    Ok(())
}

/// Parse a multipart submission: `feedback_text`, `selected_options`
/// (JSON-encoded array), and any number of `image_*` file parts.
async fn ingest_submission(mut multipart: Multipart) -> crate::Result<FeedbackResult> {
    let mut result = FeedbackResult::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::InvalidInput(format!("malformed multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };
        match name.as_str() {
            "feedback_text" => {
                result.user_input = field
                    .text()
                    .await
                    .map_err(|err| AppError::InvalidInput(format!("bad feedback_text: {err}")))?
                    .trim()
                    .to_owned();
            }
            "selected_options" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| AppError::InvalidInput(format!("bad selected_options: {err}")))?;
                match serde_json::from_str::<Vec<String>>(&raw) {
                    Ok(options) => result.selected_options = options,
                    Err(err) => {
                        warn!(%err, "selected_options is not a JSON array, ignoring");
                    }
                }
            }
            _ if name.starts_with("image_") => {
                let filename = field
                    .file_name()
                    .map_or_else(|| name.clone(), ToOwned::to_owned);
                let declared_mime = field.content_type().map(ToOwned::to_owned);
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::InvalidInput(format!("bad file part: {err}")))?;
                match validate_image(data.to_vec(), &filename, declared_mime.as_deref()) {
                    Ok(attachment) => result.images.push(attachment),
                    Err(err) => {
                        warn!(filename = %filename, %err, "rejected uploaded file");
                    }
                }
            }
            other => {
                warn!(field = other, "ignoring unknown form field");
            }
        }
    }

    Ok(result)
}

/// `GET /api/get-notification-config`.
pub async fn get_notification_config(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.config.snapshot();
    Json(json!({ "status": "success", "config": snapshot.notification.clone() })).into_response()
}

/// `POST /api/update-notification-config` — write-back path into the
/// config file, comments preserved.
pub async fn update_notification_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<NotificationUpdate>,
) -> Response {
    match state.config.update_notification(&update) {
        Ok(_) => Json(json!({
            "status": "success",
            "message": "notification config updated",
        }))
        .into_response(),
        Err(err) => app_error_response(&err),
    }
}

/// `POST /api/test-bark` — server-mediated probe so the browser never has
/// to call the Bark endpoint across origins.
pub async fn test_bark(
    State(_state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let params = BarkParams {
        url: body
            .get("bark_url")
            .and_then(|v| v.as_str())
            .unwrap_or("https://api.day.app/push")
            .to_owned(),
        device_key: body
            .get("bark_device_key")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned(),
        icon: body
            .get("bark_icon")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned(),
        action: body
            .get("bark_action")
            .and_then(|v| v.as_str())
            .unwrap_or("none")
            .to_owned(),
    };
    if params.device_key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "device key must not be empty");
    }

    let transport = BarkTransport::new();
    match transport
        .send(
            &params,
            "AI Intervention Agent test",
            "This is a Bark test notification. Receiving it means the configuration works.",
        )
        .await
    {
        Ok(()) => {
            info!("bark test notification sent");
            Json(json!({
                "status": "success",
                "message": "bark test notification sent, check your device",
            }))
            .into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

/// `GET /api/get-feedback-prompts` — the canned texts a client needs to
/// mirror the server's synthetic submission.
pub async fn get_feedback_prompts(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.config.snapshot();
    Json(json!({
        "status": "success",
        "config": {
            "resubmit_prompt": snapshot.feedback.resubmit_prompt.clone(),
            "prompt_suffix": snapshot.feedback.prompt_suffix.clone(),
        },
    }))
    .into_response()
}

/// `GET /api/health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// `GET /` — minimal UI shell. The full front-end bundle ships separately;
/// this page only confirms the service is reachable and points at the API.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>AI Intervention Agent</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 3rem auto; max-width: 40rem; }
    code { background: #f2f2f2; padding: 0 .3rem; }
  </style>
</head>
<body>
  <h1>AI Intervention Agent</h1>
  <p>The feedback service is running. Poll <code>/api/config</code> for the
  active task, list tasks at <code>/api/tasks</code>, and submit through
  <code>/api/submit</code>.</p>
</body>
</html>
"#;
