//! Error types for the intervention core
//!
//! Nothing here is user-fatal. Every variant is either rejected at a
//! boundary (settings), treated as a no-op (stale room) or degraded to
//! "the assistant stays silent" by the caller.

use thiserror::Error;

use crate::decision::DecisionError;
use crate::scheduler::TimerClass;

/// Result type alias for intervention operations
pub type InterventionResult<T> = Result<T, InterventionError>;

/// Errors that can occur while routing signals or processing fired timers
#[derive(Error, Debug)]
pub enum InterventionError {
    /// No credentials for the decision capability
    #[error("Decision capability is not configured")]
    ConfigurationUnavailable,

    /// Settings update outside the documented ranges
    #[error("Invalid configuration for '{key}': {message}")]
    InvalidConfiguration { key: String, message: String },

    /// Inbound signal that cannot be routed
    #[error("Invalid signal: {message}")]
    InvalidSignal { message: String },

    /// Event references a room that was reset or destroyed in the meantime
    #[error("Room {room_id} was reset or removed")]
    StaleRoom { room_id: String },

    /// Processing a fired timer failed
    #[error("Timer callback failed for room {room_id} ({class}): {message}")]
    CallbackFailure {
        room_id: String,
        class: TimerClass,
        message: String,
    },

    /// Decision capability failure
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    /// Messaging collaborator rejected a delivery
    #[error("Messaging error: {message}")]
    Messaging { message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InterventionError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an invalid signal error
    pub fn invalid_signal(message: impl Into<String>) -> Self {
        Self::InvalidSignal {
            message: message.into(),
        }
    }

    /// Create a stale room error
    pub fn stale_room(room_id: impl Into<String>) -> Self {
        Self::StaleRoom {
            room_id: room_id.into(),
        }
    }

    /// Create a callback failure
    pub fn callback_failure(
        room_id: impl Into<String>,
        class: TimerClass,
        message: impl Into<String>,
    ) -> Self {
        Self::CallbackFailure {
            room_id: room_id.into(),
            class,
            message: message.into(),
        }
    }

    /// Create a messaging error
    pub fn messaging(message: impl Into<String>) -> Self {
        Self::Messaging {
            message: message.into(),
        }
    }

    /// Whether the error only means the work is no longer relevant.
    ///
    /// Stale rooms are expected after a concurrent reset and are logged at
    /// debug level instead of warn.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::StaleRoom { .. } | Self::ConfigurationUnavailable)
    }

    /// Machine-readable error code for logs and summaries
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationUnavailable => "CONFIGURATION_UNAVAILABLE",
            Self::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            Self::InvalidSignal { .. } => "INVALID_SIGNAL",
            Self::StaleRoom { .. } => "STALE_ROOM",
            Self::CallbackFailure { .. } => "CALLBACK_FAILURE",
            Self::Decision(_) => "DECISION_FAILED",
            Self::Messaging { .. } => "MESSAGING_FAILED",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}
