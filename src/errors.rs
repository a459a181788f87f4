//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Malformed request body, bad options, or out-of-range fields.
    InvalidInput(String),
    /// Requested task does not exist.
    NotFound(String),
    /// Double submit or activation of a completed task.
    Conflict(String),
    /// Client address rejected by the network access policy.
    Blocked(String),
    /// Client exceeded the per-endpoint rate limit.
    RateLimited(String),
    /// A wait or transport budget elapsed.
    Timeout(String),
    /// Notification transport failure.
    Notify(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Blocked(msg) => write!(f, "blocked: {msg}"),
            Self::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Notify(msg) => write!(f, "notify: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid config document: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
