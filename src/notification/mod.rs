//! Notification fan-out with a small buffered send queue.
//!
//! [`NotificationDispatcher::send`] returns immediately; a background
//! worker drains the queue and fires each enabled transport
//! independently. The worker consults the live config snapshot for every
//! event, so toggling a transport in the UI takes effect on the next
//! event without any restart. A transport failing never affects another
//! transport, the queue, or any RPC.

pub mod bark;
pub mod system;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConfigStore;

const QUEUE_CAPACITY: usize = 256;

/// Wall-clock budget for one transport attempt chain.
const TRANSPORT_BUDGET: Duration = Duration::from_secs(15);

/// One out-of-band human alert.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub id: String,
    /// Task that triggered the alert.
    pub task_id: String,
    pub title: String,
    pub message: String,
}

impl NotificationEvent {
    /// Alert for a newly arrived feedback task.
    #[must_use]
    pub fn new_task(task_id: &str, project: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_owned(),
            title: "AI Intervention Agent".to_owned(),
            message: format!("New feedback request in '{project}' — please review and reply"),
        }
    }
}

/// Handles for the dispatcher's background worker.
pub struct NotificationRuntime {
    pub worker_task: JoinHandle<()>,
}

/// Fire-and-forget notification front end.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue_tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    /// Start the dispatcher and its worker task.
    #[must_use]
    pub fn start(config: Arc<ConfigStore>) -> (Self, NotificationRuntime) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker_task = Self::spawn_worker(config, queue_rx);
        info!("notification dispatcher started");
        (Self { queue_tx }, NotificationRuntime { worker_task })
    }

    /// Enqueue an event for async delivery. Never blocks; a full queue
    /// drops the event with a warning.
    pub fn send(&self, event: NotificationEvent) {
        if let Err(err) = self.queue_tx.try_send(event) {
            warn!(%err, "notification queue full, event dropped");
        }
    }

    fn spawn_worker(
        config: Arc<ConfigStore>,
        mut queue_rx: mpsc::Receiver<NotificationEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let bark = bark::BarkTransport::new();
            while let Some(event) = queue_rx.recv().await {
                // Re-read the snapshot per event so UI toggles apply to the
                // very next notification.
                let snapshot = config.snapshot();
                let settings = &snapshot.notification;
                if !settings.enabled {
                    debug!(event_id = %event.id, task_id = %event.task_id, "notifications disabled, skipping");
                    continue;
                }

                // Web toast and sound ride on the UI's next poll; the task
                // is already visible, so there is nothing to push.
                if settings.web_enabled {
                    debug!(event_id = %event.id, "web toast pending next UI poll");
                }
                if settings.sound_enabled && !settings.sound_mute {
                    debug!(
                        event_id = %event.id,
                        volume = settings.sound_volume,
                        "sound alert pending next UI poll"
                    );
                }

                match tokio::time::timeout(
                    TRANSPORT_BUDGET,
                    system::send(event.title.clone(), event.message.clone()),
                )
                .await
                {
                    Ok(Ok(())) => debug!(event_id = %event.id, "system notification sent"),
                    Ok(Err(err)) => debug!(event_id = %event.id, %err, "system notification unavailable"),
                    Err(_) => warn!(event_id = %event.id, "system notification timed out"),
                }

                if settings.bark_enabled {
                    let params = bark::BarkParams::from_config(settings);
                    match tokio::time::timeout(
                        TRANSPORT_BUDGET,
                        bark.send(&params, &event.title, &event.message),
                    )
                    .await
                    {
                        Ok(Ok(())) => info!(event_id = %event.id, "bark notification sent"),
                        Ok(Err(err)) => warn!(event_id = %event.id, %err, "bark notification failed"),
                        Err(_) => warn!(event_id = %event.id, "bark notification timed out"),
                    }
                }
            }
            info!("notification worker exiting");
        })
    }
}
