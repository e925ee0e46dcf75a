//! Structured error types for deskpilot
//!
//! Provides type-safe error handling with rich context for debugging,
//! retry classification, and client-facing messages.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for deskpilot operations
#[derive(Error, Debug)]
pub enum DeskpilotError {
    // =========================================================================
    // Action Validation Errors
    // =========================================================================
    /// Action arguments are missing a required field or carry a bad value
    #[error("invalid {action} action: {detail}")]
    InvalidAction { action: String, detail: String },

    /// Action kind the dispatcher does not know
    #[error("unsupported action: {action}")]
    UnsupportedAction { action: String },

    /// Tool called with arguments that do not match its schema
    #[error("invalid arguments for tool {tool_name}: {reason}")]
    InvalidToolArguments { tool_name: String, reason: String },

    /// Tool name the orchestrator has no handler for
    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String },

    // =========================================================================
    // Remote Desktop / Session Errors
    // =========================================================================
    /// Session could not be resolved on the backend
    #[error("session {session_id} unavailable: {reason}")]
    SessionUnavailable { session_id: String, reason: String },

    /// Backend answered an automation request with an error status
    #[error("desktop backend error: {status} - {message}")]
    DesktopBackend { status: u16, message: String },

    /// Automation request never reached the backend
    #[error("desktop request failed: {message}")]
    DesktopRequest { message: String },

    // =========================================================================
    // Model Provider Errors
    // =========================================================================
    /// Authentication/authorization errors
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Provider returned an error status
    #[error("provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Error event delivered inside an otherwise healthy stream
    #[error("provider stream error: {kind}: {message}")]
    ApiError { kind: String, message: String },

    /// Stream cut off mid-response
    #[error("stream disconnected: {reason}")]
    StreamDisconnected { reason: String },

    /// Provider payload that does not parse as the wire shape
    #[error("malformed model response: {detail}")]
    MalformedResponse { detail: String },

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// Interaction cancelled from the outside
    #[error("{reason}")]
    Aborted { reason: String },

    /// Interaction ran past its wall-clock budget
    #[error("interaction timed out after {seconds}s")]
    Deadline { seconds: u64 },

    /// Model kept requesting tools past the turn budget
    #[error("turn limit reached (max {max_turns})")]
    TurnLimitReached { max_turns: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Required configuration key absent
    #[error("missing configuration: {key}")]
    MissingConfig { key: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Catch-all for unexpected internal failures
    #[error("internal error: {message}")]
    Internal { message: String },

    // =========================================================================
    // External Library Errors (wrapped)
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl DeskpilotError {
    /// Whether retrying the same operation could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DeskpilotError::Provider { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            DeskpilotError::DesktopBackend { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            DeskpilotError::ApiError { kind, .. } => {
                matches!(kind.as_str(), "overloaded_error" | "api_error")
            }
            DeskpilotError::StreamDisconnected { .. } => true,
            DeskpilotError::DesktopRequest { .. } => true,
            DeskpilotError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Suggested delay before a retry, for errors where one makes sense
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            DeskpilotError::Provider { status: 429, .. } => Some(Duration::from_secs(5)),
            DeskpilotError::Provider { .. } if self.is_retryable() => Some(Duration::from_secs(2)),
            DeskpilotError::ApiError { .. } if self.is_retryable() => Some(Duration::from_secs(2)),
            DeskpilotError::StreamDisconnected { .. } => Some(Duration::from_secs(1)),
            DeskpilotError::DesktopRequest { .. } => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// True for errors scoped to a single tool call. These go back to the
    /// model as a failed tool result instead of ending the interaction.
    pub fn is_action_validation(&self) -> bool {
        matches!(
            self,
            DeskpilotError::InvalidAction { .. }
                | DeskpilotError::UnsupportedAction { .. }
                | DeskpilotError::InvalidToolArguments { .. }
        )
    }

    /// Short stable identifier for the wire protocol's error events
    pub fn code(&self) -> &'static str {
        match self {
            DeskpilotError::InvalidAction { .. } => "invalid_action",
            DeskpilotError::UnsupportedAction { .. } => "unsupported_action",
            DeskpilotError::InvalidToolArguments { .. } => "invalid_tool_arguments",
            DeskpilotError::ToolNotFound { .. } => "tool_not_found",
            DeskpilotError::SessionUnavailable { .. } => "session_unavailable",
            DeskpilotError::DesktopBackend { .. } | DeskpilotError::DesktopRequest { .. } => {
                "desktop_error"
            }
            DeskpilotError::Unauthorized { .. } => "unauthorized",
            DeskpilotError::Provider { .. }
            | DeskpilotError::ApiError { .. }
            | DeskpilotError::StreamDisconnected { .. }
            | DeskpilotError::MalformedResponse { .. } => "provider_error",
            DeskpilotError::Aborted { .. } => "aborted",
            DeskpilotError::Deadline { .. } => "deadline",
            DeskpilotError::TurnLimitReached { .. } => "turn_limit",
            DeskpilotError::InvalidConfig { .. } | DeskpilotError::MissingConfig { .. } => {
                "config_error"
            }
            _ => "internal_error",
        }
    }

    /// Message safe to surface to a client. Validation errors keep their
    /// detail so the caller can correct the request; orchestration-level
    /// failures collapse to a generic message and stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DeskpilotError::InvalidAction { .. }
            | DeskpilotError::UnsupportedAction { .. }
            | DeskpilotError::InvalidToolArguments { .. } => self.to_string(),
            DeskpilotError::Unauthorized { .. } => {
                "Authentication failed. Check your API key.".to_string()
            }
            DeskpilotError::MissingConfig { key } => {
                format!("Missing configuration: {key}")
            }
            DeskpilotError::Aborted { reason } => reason.clone(),
            DeskpilotError::Deadline { .. } => {
                "The interaction exceeded its time limit.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<anyhow::Error> for DeskpilotError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return DeskpilotError::Io(std::io::Error::new(io_err.kind(), err.to_string()));
        }
        DeskpilotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeskpilotError {
    fn from(err: serde_json::Error) -> Self {
        DeskpilotError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for DeskpilotError {
    fn from(err: reqwest::Error) -> Self {
        DeskpilotError::Http(err.to_string())
    }
}

/// Convenience Result alias
pub type Result<T> = std::result::Result<T, DeskpilotError>;

/// Extension trait for Option -> Result conversions
pub trait OptionExt<T> {
    fn ok_or_missing(self, key: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing(self, key: &str) -> Result<T> {
        self.ok_or_else(|| DeskpilotError::MissingConfig {
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let rate_limited = DeskpilotError::Provider {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_delay(), Some(Duration::from_secs(5)));

        let overloaded = DeskpilotError::ApiError {
            kind: "overloaded_error".to_string(),
            message: "busy".to_string(),
        };
        assert!(overloaded.is_retryable());

        let bad_request = DeskpilotError::Provider {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!bad_request.is_retryable());
        assert_eq!(bad_request.retry_delay(), None);

        let validation = DeskpilotError::InvalidAction {
            action: "left_click".to_string(),
            detail: "missing field `coordinate`".to_string(),
        };
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_action_validation_scope() {
        assert!(DeskpilotError::UnsupportedAction {
            action: "fly".to_string()
        }
        .is_action_validation());
        assert!(DeskpilotError::InvalidToolArguments {
            tool_name: "bash".to_string(),
            reason: "missing field `command`".to_string(),
        }
        .is_action_validation());
        assert!(!DeskpilotError::DesktopRequest {
            message: "connection refused".to_string()
        }
        .is_action_validation());
        assert!(!DeskpilotError::ToolNotFound {
            tool_name: "browser".to_string()
        }
        .is_action_validation());
    }

    #[test]
    fn test_user_messages_mask_internals() {
        let provider = DeskpilotError::Provider {
            status: 500,
            message: "upstream exploded with a stack trace".to_string(),
        };
        assert_eq!(provider.user_message(), "Internal server error");

        let validation = DeskpilotError::InvalidAction {
            action: "scroll".to_string(),
            detail: "invalid value: integer `0`".to_string(),
        };
        assert!(validation.user_message().contains("scroll"));

        let aborted = DeskpilotError::Aborted {
            reason: "User aborted".to_string(),
        };
        assert_eq!(aborted.user_message(), "User aborted");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DeskpilotError::Deadline { seconds: 300 }.code(),
            "deadline"
        );
        assert_eq!(
            DeskpilotError::StreamDisconnected {
                reason: "eof".to_string()
            }
            .code(),
            "provider_error"
        );
    }

    #[test]
    fn test_option_ext() {
        let missing: Option<String> = None;
        let err = missing.ok_or_missing("model.api_key").unwrap_err();
        assert!(matches!(err, DeskpilotError::MissingConfig { .. }));
        assert_eq!(err.user_message(), "Missing configuration: model.api_key");

        let present = Some(7u32);
        assert_eq!(present.ok_or_missing("x").unwrap(), 7);
    }
}
