//! Rendezvous registry: one-shot result hand-off to blocked RPC callers.
//!
//! A pure synchronization primitive — it knows nothing about config,
//! notifications, or HTTP. Each task id maps to at most one pending
//! `oneshot` sender; delivering to an unknown or already-consumed slot is
//! a silent no-op so the scheduler losing a race against a human
//! submission never errors.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::models::task::{FeedbackResult, TaskOutcome};

/// What a bounded wait resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A submission arrived before the overall deadline.
    Submitted(FeedbackResult),
    /// The overall deadline elapsed with no submission.
    TimedOut,
    /// The process is shutting down.
    Cancelled,
}

/// Registry of pending per-task completion slots.
#[derive(Default)]
pub struct RendezvousRegistry {
    slots: Mutex<HashMap<String, oneshot::Sender<TaskOutcome>>>,
}

impl RendezvousRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh slot for a task and return its receiving end.
    /// Re-registering replaces any stale sender from an earlier RPC
    /// lifetime (the stale waiter resolves as cancelled).
    pub async fn register(&self, task_id: &str) -> oneshot::Receiver<TaskOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().await;
        if slots.insert(task_id.to_owned(), tx).is_some() {
            debug!(task_id, "replaced stale rendezvous slot");
        }
        rx
    }

    /// Fill a task's slot. Safe to call concurrently with a waiter; a
    /// missing slot (already delivered, or never registered) is ignored.
    pub async fn deliver(&self, task_id: &str, outcome: TaskOutcome) {
        let sender = self.slots.lock().await.remove(task_id);
        if let Some(tx) = sender {
            // The waiter may have given up; that is not an error either.
            let _ = tx.send(outcome);
        } else {
            debug!(task_id, "deliver to absent slot ignored");
        }
    }

    /// Wake one waiter with a cancellation outcome.
    pub async fn cancel(&self, task_id: &str) {
        self.deliver(task_id, TaskOutcome::Cancelled).await;
    }

    /// Wake every outstanding waiter with a cancellation outcome. Called
    /// on process shutdown.
    pub async fn cancel_all(&self) {
        let drained: Vec<_> = self.slots.lock().await.drain().collect();
        for (task_id, tx) in drained {
            debug!(task_id = %task_id, "cancelling outstanding wait");
            let _ = tx.send(TaskOutcome::Cancelled);
        }
    }

    /// Drop a slot without waking its waiter. Used when registration
    /// succeeded but a later setup step failed before any wait began.
    pub async fn discard(&self, task_id: &str) {
        self.slots.lock().await.remove(task_id);
    }

    /// Block on a slot until it fills, the overall deadline elapses, or a
    /// cancellation is delivered.
    pub async fn wait(
        rx: oneshot::Receiver<TaskOutcome>,
        overall_deadline: Duration,
    ) -> WaitOutcome {
        match tokio::time::timeout(overall_deadline, rx).await {
            Ok(Ok(TaskOutcome::Submitted(result))) => WaitOutcome::Submitted(result),
            Ok(Ok(TaskOutcome::Cancelled)) => WaitOutcome::Cancelled,
            // Sender dropped without sending: the slot owner went away,
            // which only happens on teardown.
            Ok(Err(_)) => WaitOutcome::Cancelled,
            Err(_elapsed) => WaitOutcome::TimedOut,
        }
    }
}
