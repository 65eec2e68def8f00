//! Decision capability boundary
//!
//! The capability is a black box: given a room snapshot and a trigger kind it
//! answers `Decline` or `Intervene { text }`. It may be slow or fail; the
//! [`DecisionAdapter`] absorbs both so the scheduler only ever sees an
//! outcome.
//!
//! ```text
//! RoomContext ──▶ DecisionRequest ──▶ DecisionAdapter ──▶ DecisionCapability
//!                                       │ timeout           (HTTP, scripted, ...)
//!                                       │ circuit breaker
//!                                       ▼
//!                                DecisionOutcome (never an error)
//! ```

pub mod adapter;
pub mod breaker;
pub mod error;
pub mod openai;
pub mod prompts;
pub mod request;
pub mod types;

use async_trait::async_trait;

pub use adapter::{DecisionAdapter, DEFAULT_DECISION_TIMEOUT};
pub use breaker::{CircuitBreaker, CircuitState};
pub use error::{DecisionError, DecisionResult};
pub use openai::{CapabilityConfig, OpenAiCapability};
pub use request::{DecisionRequest, EscalationBrief};
pub use types::{Decision, DecisionOutcome, TriggerKind};

/// An external service that decides whether and what the assistant says
#[async_trait]
pub trait DecisionCapability: Send + Sync {
    /// Decide for one request
    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<DecisionOutcome>;

    /// Short name for logs
    fn name(&self) -> &str;
}
