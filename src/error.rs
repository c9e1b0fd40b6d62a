//! Error types for the aiya dispatch engine.

use crate::reply::{FollowUpAction, Notice};
use crate::types::UserId;
use thiserror::Error;

/// A single field that failed validation, as named by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Backend-related errors
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    #[error("Backend authentication failed: {0}")]
    AuthFailed(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend response could not be decoded: {0}")]
    Decode(String),

    #[error("Image could not be fetched from {url}: {reason}")]
    ImageFetch { url: String, reason: String },

    #[error("Backend error: {0}")]
    Other(String),
}

/// Engine errors. Every variant is handled at the boundary that detects it.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error("User {0} already has a queued job")]
    AdmissionRejected(UserId),

    #[error("User {invoker} may not use {action:?} on a result owned by {owner}")]
    AuthorizationDenied {
        action: FollowUpAction,
        invoker: UserId,
        owner: UserId,
    },

    #[error("Validation failed for {} field(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("Backend failure: {0}")]
    BackendFailure(String),

    #[error("Interaction is stale: {0}")]
    StaleInteraction(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Reply delivery failed: {0}")]
    Delivery(String),

    #[error("Timed out after {waited_ms} ms: {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BotError {
    /// The user-facing notice for this error.
    pub fn notice(&self) -> Notice {
        match self {
            BotError::AdmissionRejected(_) => Notice::ephemeral("Please wait! You're queued up."),
            BotError::AuthorizationDenied { action, .. } => match action {
                FollowUpAction::Delete => {
                    Notice::ephemeral("You can't delete other people's images!")
                }
                other => Notice::ephemeral(format!(
                    "You can't use other people's {}!",
                    other.emoji()
                )),
            },
            BotError::ValidationFailed(errors) => {
                let lines: Vec<String> = errors
                    .iter()
                    .map(|e| format!("``{}``: {}", e.field, e.reason))
                    .collect();
                Notice::ephemeral(format!(
                    "I couldn't apply those changes:\n{}",
                    lines.join("\n")
                ))
            }
            BotError::StaleInteraction(_) => Notice::ephemeral(
                "I may have been restarted. This button no longer works.",
            )
            .disabling_control(),
            BotError::BackendFailure(msg) => Notice::public(msg.clone()),
            other => Notice::ephemeral(other.to_string()),
        }
    }

    /// Whether the error is part of normal operation rather than a fault worth logging.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            BotError::AdmissionRejected(_)
                | BotError::AuthorizationDenied { .. }
                | BotError::ValidationFailed(_)
        )
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::ConfigError(err.to_string())
    }
}
