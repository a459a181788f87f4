//! `interactive_feedback` MCP tool handler.
//!
//! Creates a task in the queue, registers a rendezvous slot, arms the
//! auto-resubmit deadline, fires a notification, then blocks until a
//! submission arrives or the overall timeout elapses. The reply is always
//! a sequence of content blocks; images become base64 here and nowhere
//! else.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::{CallToolResult, Content};
use tracing::{info, info_span, warn, Instrument};

use crate::mcp::handler::InterventionServer;
use crate::models::task::FeedbackResult;
use crate::notification::NotificationEvent;
use crate::rendezvous::{RendezvousRegistry, WaitOutcome};
use crate::AppError;

/// Longest accepted prompt; longer prompts are truncated with a marker.
const MAX_PROMPT_LEN: usize = 10_000;

/// Longest accepted predefined option.
const MAX_OPTION_LEN: usize = 500;

/// Input parameters for one feedback request.
#[derive(Debug, serde::Deserialize)]
struct FeedbackInput {
    prompt: String,
    /// Raw values; non-strings are skipped during validation.
    #[serde(default)]
    predefined_options: Vec<serde_json::Value>,
    /// Seconds until auto-resubmit; 0 disables it for this task.
    #[serde(default)]
    auto_resubmit_timeout: u64,
}

/// Normalize and bound the caller's prompt and options.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` when the prompt is empty after
/// trimming.
pub fn validate_input(
    prompt: &str,
    options: &[serde_json::Value],
) -> crate::Result<(String, Vec<String>)> {
    let mut cleaned_prompt = prompt.trim().to_owned();
    if cleaned_prompt.is_empty() {
        return Err(AppError::InvalidInput("prompt must not be empty".into()));
    }
    if cleaned_prompt.chars().count() > MAX_PROMPT_LEN {
        warn!(len = cleaned_prompt.len(), "prompt truncated");
        cleaned_prompt = cleaned_prompt.chars().take(MAX_PROMPT_LEN).collect::<String>() + "...";
    }

    let mut cleaned_options = Vec::with_capacity(options.len());
    for option in options {
        let Some(text) = option.as_str() else {
            warn!(?option, "skipping non-string predefined option");
            continue;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_OPTION_LEN {
            warn!("predefined option truncated");
            cleaned_options.push(trimmed.chars().take(MAX_OPTION_LEN).collect::<String>() + "...");
        } else {
            cleaned_options.push(trimmed.to_owned());
        }
    }
    Ok((cleaned_prompt, cleaned_options))
}

/// Assemble the wire reply from a recorded result. This is the single
/// boundary where internal `{bytes, mime}` attachments become the
/// `{type:"image", data, mimeType}` triple.
#[must_use]
pub fn assemble_content(result: &FeedbackResult) -> Vec<Content> {
    let mut text_parts = Vec::new();
    if !result.selected_options.is_empty() {
        text_parts.push(format!(
            "Selected options: {}",
            result.selected_options.join(", ")
        ));
    }
    if !result.user_input.is_empty() {
        text_parts.push(format!("User input: {}", result.user_input));
    }

    let mut blocks = Vec::new();
    if !text_parts.is_empty() {
        blocks.push(Content::text(text_parts.join("\n\n")));
    }
    for image in &result.images {
        blocks.push(Content::image(BASE64.encode(&image.bytes), image.mime.clone()));
    }
    if blocks.is_empty() {
        blocks.push(Content::text("No content provided."));
    }
    blocks
}

/// Handle the `interactive_feedback` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` on validation failures, a full queue, or
/// shutdown cancellation.
pub async fn handle(
    context: ToolCallContext<'_, InterventionServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args: serde_json::Map<String, serde_json::Value> = context.arguments.unwrap_or_default();

    let input: FeedbackInput = serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|err| {
            rmcp::ErrorData::invalid_params(
                format!("invalid interactive_feedback parameters: {err}"),
                None,
            )
        })?;

    let (prompt, options) = validate_input(&input.prompt, &input.predefined_options)
        .map_err(|err| rmcp::ErrorData::invalid_params(err.to_string(), None))?;

    let span = info_span!(
        "interactive_feedback",
        auto_resubmit_timeout = input.auto_resubmit_timeout,
    );

    async move {
        // ── Enqueue and register the completion slot ─────────
        let task_id = state
            .queue
            .add(prompt, options, input.auto_resubmit_timeout)
            .map_err(|err| rmcp::ErrorData::internal_error(err.to_string(), None))?;
        let rx = state.rendezvous.register(&task_id).await;

        // ── Arm the deadline timer ───────────────────────────
        let deadline = state.queue.get(&task_id).and_then(|task| task.deadline);
        if let Some(deadline) = deadline {
            state.scheduler.arm(&task_id, deadline).await;
        }

        // ── Out-of-band alert ────────────────────────────────
        state
            .notifier
            .send(NotificationEvent::new_task(&task_id, state.queue.project()));

        // ── Block until resolution ───────────────────────────
        let overall = Duration::from_secs(state.config.snapshot().feedback.timeout);
        let outcome = RendezvousRegistry::wait(rx, overall).await;

        state.scheduler.disarm(&task_id).await;
        state.queue.evict(&task_id);

        match outcome {
            WaitOutcome::Submitted(result) => {
                info!(
                    task_id = %task_id,
                    options = result.selected_options.len(),
                    images = result.images.len(),
                    "feedback received"
                );
                Ok(CallToolResult::success(assemble_content(&result)))
            }
            WaitOutcome::TimedOut => {
                let canned = state.config.snapshot().feedback.resubmit_prompt.clone();
                info!(task_id = %task_id, "overall wait timed out, returning canned reply");
                Ok(CallToolResult::success(vec![Content::text(canned)]))
            }
            WaitOutcome::Cancelled => {
                warn!(task_id = %task_id, "feedback wait cancelled by shutdown");
                Err(rmcp::ErrorData::internal_error(
                    "server shutting down before feedback arrived",
                    None,
                ))
            }
        }
    }
    .instrument(span)
    .await
}
