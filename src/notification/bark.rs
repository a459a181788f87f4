//! Bark push transport — HTTPS POST to a user-operated endpoint.

use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::config::NotificationConfig;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;

/// Parameters for one Bark delivery.
#[derive(Debug, Clone)]
pub struct BarkParams {
    pub url: String,
    pub device_key: String,
    pub icon: String,
    pub action: String,
}

impl BarkParams {
    /// Read the current Bark parameters out of a notification section.
    #[must_use]
    pub fn from_config(settings: &NotificationConfig) -> Self {
        Self {
            url: settings.bark_url.clone(),
            device_key: settings.bark_device_key.clone(),
            icon: settings.bark_icon.clone(),
            action: settings.bark_action.clone(),
        }
    }
}

/// Bark HTTP client with a fixed per-request timeout.
pub struct BarkTransport {
    client: reqwest::Client,
}

impl Default for BarkTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BarkTransport {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("ai-intervention-agent")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Deliver one push, retrying a bounded number of times.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notify` on incomplete parameters or when every
    /// attempt fails.
    pub async fn send(&self, params: &BarkParams, title: &str, body: &str) -> Result<()> {
        if params.url.is_empty() || params.device_key.is_empty() {
            return Err(AppError::Notify(
                "bark url and device key must both be set".into(),
            ));
        }

        let mut payload = json!({
            "title": title,
            "body": body,
            "device_key": params.device_key,
            "action": params.action,
        });
        if !params.icon.is_empty() {
            payload["icon"] = json!(params.icon);
        }

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.post(&params.url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    last_error = format!("bark endpoint returned {}", response.status());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
            if attempt < MAX_ATTEMPTS {
                warn!(attempt, error = %last_error, "bark delivery failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(AppError::Notify(last_error))
    }
}
