//! Auto-resubmit scheduler: per-task deadline timers.
//!
//! Every task armed here completes no later than its deadline even if the
//! human never responds. One background task per armed deadline waits on
//! the wall clock, then synthesizes a submission carrying the configured
//! `resubmit_prompt`. The queue arbitrates the race against a concurrent
//! human submission; losing it is a logged no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::models::task::{FeedbackResult, TaskOutcome};
use crate::queue::TaskQueue;
use crate::rendezvous::RendezvousRegistry;

/// Owner of all armed deadline timers.
pub struct ResubmitScheduler {
    queue: Arc<TaskQueue>,
    rendezvous: Arc<RendezvousRegistry>,
    config: Arc<ConfigStore>,
    timers: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ResubmitScheduler {
    #[must_use]
    pub fn new(
        queue: Arc<TaskQueue>,
        rendezvous: Arc<RendezvousRegistry>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            queue,
            rendezvous,
            config,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm (or re-arm) the deadline timer for a task. A second arming of
    /// the same task replaces the first.
    pub async fn arm(&self, task_id: &str, deadline: DateTime<Utc>) {
        let token = CancellationToken::new();
        {
            let mut timers = self.timers.lock().await;
            if let Some(old) = timers.insert(task_id.to_owned(), token.clone()) {
                debug!(task_id, "re-arming replaces existing timer");
                old.cancel();
            }
        }

        let queue = Arc::clone(&self.queue);
        let rendezvous = Arc::clone(&self.rendezvous);
        let config = Arc::clone(&self.config);
        let timers = Arc::clone(&self.timers);
        let task_id = task_id.to_owned();

        tokio::spawn(async move {
            // Sleep in bounded slices and re-check the wall clock, so the
            // timer fires no earlier than the deadline and within one tick
            // after it even if the clock was coarse when armed.
            loop {
                let remaining = (deadline - Utc::now()).num_milliseconds();
                if remaining <= 0 {
                    break;
                }
                let slice = Duration::from_millis(remaining.min(60_000).unsigned_abs());
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(task_id = %task_id, "resubmit timer disarmed");
                        return;
                    }
                    () = tokio::time::sleep(slice) => {}
                }
            }

            timers.lock().await.remove(&task_id);

            let prompt = config.snapshot().feedback.resubmit_prompt.clone();
            let synthesized = FeedbackResult::text(prompt);
            match queue.submit(&task_id, synthesized) {
                Ok(result) => {
                    info!(task_id = %task_id, "deadline fired — auto-resubmitted");
                    rendezvous
                        .deliver(&task_id, TaskOutcome::Submitted(result))
                        .await;
                }
                Err(err) => {
                    // A human submission won the race.
                    debug!(task_id = %task_id, %err, "auto-resubmit lost to concurrent submit");
                }
            }
        });
    }

    /// Cancel the timer for one task. Called on every successful human
    /// submission and on eviction.
    pub async fn disarm(&self, task_id: &str) {
        if let Some(token) = self.timers.lock().await.remove(task_id) {
            token.cancel();
        }
    }

    /// Number of currently armed timers.
    #[must_use]
    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Cancel every armed timer. Called on process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.timers.lock().await.drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "disarming timers on shutdown");
        }
        for (_, token) in drained {
            token.cancel();
        }
    }
}
