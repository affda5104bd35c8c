use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SessionState;

/// Broad error category used for user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceErrorCategory {
    /// Local file rejected before any network call.
    Validation,
    /// Non-2xx response or network failure.
    Transport,
    /// Credential rejected by the media API.
    Auth,
    /// Rate-limited or timed out by the media API.
    RateLimited,
    /// Local image could not be decoded for preview.
    Preview,
    /// Invalid configuration or a command that is disabled.
    Config,
    /// Response body could not be decoded.
    Serialization,
    /// Broken invariant or invalid state transition.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ResourceError {
    pub category: ResourceErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status when the error came from a response.
    pub status: Option<u16>,
}

impl ResourceError {
    pub fn new(
        category: ResourceErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Local validation failure (size or type).
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ResourceErrorCategory::Validation, code, message)
    }

    /// Failure reported by an HTTP response with the given status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            category: classify_http_status(status),
            code: "http_status".to_owned(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Connection-level failure without a response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorCategory::Transport, "network_error", message)
    }

    /// Request exceeded the configured timeout.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ResourceErrorCategory::Transport,
            "request_timeout",
            format!("request timed out after {} ms", after.as_millis()),
        )
    }

    /// Local decode failure while building an upload preview.
    pub fn preview(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorCategory::Preview, "preview_failed", message)
    }

    /// Command rejected because the matching feature toggle is off.
    pub fn disabled(feature: &str) -> Self {
        Self::new(
            ResourceErrorCategory::Config,
            "feature_disabled",
            format!("{feature} is disabled for this widget"),
        )
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: SessionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ResourceErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while widget is {current:?}"),
        )
    }

    /// Whether this error came from the remote API or the connection to it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.category,
            ResourceErrorCategory::Transport
                | ResourceErrorCategory::Auth
                | ResourceErrorCategory::RateLimited
        )
    }
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ResourceErrorCategory {
    match status {
        401 | 403 => ResourceErrorCategory::Auth,
        408 | 429 => ResourceErrorCategory::RateLimited,
        _ => ResourceErrorCategory::Transport,
    }
}

/// Extract the user-facing message from a failed response body.
///
/// Uses the JSON `message` field when present, else `HTTP <status>`.
pub fn message_from_error_body(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}
