//! Task model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status for a feedback task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task queued but not shown as the current one.
    Pending,
    /// Task the UI is currently presenting.
    Active,
    /// Result recorded; retained until the RPC caller consumes it.
    Completed,
}

/// One image attached to a submission.
///
/// Raw bytes plus MIME type only; base64 conversion happens at exactly one
/// boundary, the RPC reply assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Sanitized original filename, kept for display.
    pub filename: String,
    /// Detected MIME type from the magic-number check.
    pub mime: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// Normalized submission payload recorded on a completed task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackResult {
    /// Free-form text the human typed.
    pub user_input: String,
    /// Predefined options the human picked.
    pub selected_options: Vec<String>,
    /// Attached images.
    pub images: Vec<ImageAttachment>,
}

impl FeedbackResult {
    /// A text-only result, as synthesized by the auto-resubmit scheduler.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            user_input: text.into(),
            selected_options: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// Outcome handed to the blocked RPC caller through the rendezvous slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A submission arrived — human or synthesized by the scheduler.
    Submitted(FeedbackResult),
    /// The process is shutting down; no result will arrive.
    Cancelled,
}

/// One unit of human-interactive work produced by one RPC call.
#[derive(Debug, Clone)]
pub struct Task {
    /// Process-unique identifier, `<project-slug>-<NNNN>`.
    pub id: String,
    /// Request text shown to the human (Markdown-like, opaque here).
    pub prompt: String,
    /// Predefined choices the UI may offer.
    pub predefined_options: Vec<String>,
    /// Auto-resubmit deadline in seconds; 0 disables auto-resubmit.
    pub auto_resubmit_timeout: u64,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Fixed wall-clock deadline; never rewritten after creation.
    pub deadline: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set exactly once at completion.
    pub result: Option<FeedbackResult>,
}

impl Task {
    /// Construct a pending task; the deadline is derived from
    /// `auto_resubmit_timeout` at creation and fixed thereafter.
    #[must_use]
    pub fn new(
        id: String,
        prompt: String,
        predefined_options: Vec<String>,
        auto_resubmit_timeout: u64,
    ) -> Self {
        let created_at = Utc::now();
        // Clamp so absurd timeouts cannot overflow the time arithmetic.
        let max_seconds = i64::MAX / 1_000;
        let seconds = i64::try_from(auto_resubmit_timeout)
            .unwrap_or(max_seconds)
            .min(max_seconds);
        let deadline =
            (auto_resubmit_timeout > 0).then(|| created_at + chrono::Duration::seconds(seconds));
        Self {
            id,
            prompt,
            predefined_options,
            auto_resubmit_timeout,
            status: TaskStatus::Pending,
            created_at,
            deadline,
            completed_at: None,
            result: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Status only ever advances `pending → active → completed`, with the
    /// single exception of an active task being demoted back to pending by
    /// an explicit activation of another task.
    #[must_use]
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self.status, next),
            (TaskStatus::Pending, TaskStatus::Active | TaskStatus::Completed)
                | (TaskStatus::Active, TaskStatus::Pending | TaskStatus::Completed)
        )
    }

    /// Seconds left until the deadline, floored at zero.
    ///
    /// `None` when auto-resubmit is disabled for this task.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|d| (d - now).num_seconds().max(0))
    }
}
