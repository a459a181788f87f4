//! Native OS notification transport.
//!
//! Desktop notification daemons are synchronous and may be absent
//! entirely (headless hosts, SSH sessions); delivery is best-effort and
//! failures are reported as `AppError::Notify` for the caller to log.

use crate::{AppError, Result};

/// Show a desktop notification.
///
/// # Errors
///
/// Returns `AppError::Notify` when no notification service is reachable.
pub async fn send(title: String, body: String) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        notify_rust::Notification::new()
            .appname("AI Intervention Agent")
            .summary(&title)
            .body(&body)
            .show()
            .map(|_| ())
            .map_err(|err| AppError::Notify(err.to_string()))
    })
    .await
    .map_err(|err| AppError::Notify(format!("notification task panicked: {err}")))?
}
