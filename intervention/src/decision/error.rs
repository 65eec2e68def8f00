use std::time::Duration;

use thiserror::Error;

/// Result type alias for decision capability calls
pub type DecisionResult<T> = Result<T, DecisionError>;

/// Ways a decision capability call can fail.
///
/// The adapter turns every one of these into a decline.
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("Decision capability unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Capability returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit open after repeated failures")]
    CircuitOpen,
}

impl DecisionError {
    /// Whether the failure should count against the circuit breaker
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::CircuitOpen | Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for DecisionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
