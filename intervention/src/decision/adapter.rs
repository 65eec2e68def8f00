//! Decision adapter — the only way the engine talks to a capability
//!
//! Wraps an optional capability with a per-call timeout and a circuit
//! breaker. `decide` never fails: a missing capability, an open circuit, a
//! timeout, a transport error or a malformed response all come back as a
//! decline, logged with the room and trigger.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::breaker::{CircuitBreaker, CircuitState};
use super::error::{DecisionError, DecisionResult};
use super::request::DecisionRequest;
use super::types::{DecisionOutcome, TriggerKind};
use super::DecisionCapability;

/// Default per-call timeout
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(20);

pub struct DecisionAdapter {
    capability: Option<Arc<dyn DecisionCapability>>,
    timeout: Duration,
    breaker: Mutex<CircuitBreaker>,
}

impl DecisionAdapter {
    pub fn new(capability: Option<Arc<dyn DecisionCapability>>) -> Self {
        Self {
            capability,
            timeout: DEFAULT_DECISION_TIMEOUT,
            breaker: Mutex::new(CircuitBreaker::default()),
        }
    }

    /// Adapter with no capability; every decision is a decline
    pub fn unavailable() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Mutex::new(breaker);
        self
    }

    /// Whether a capability is configured at all
    pub fn is_configured(&self) -> bool {
        self.capability.is_some()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Ask the capability, surfacing failures
    pub async fn try_decide(&self, request: &DecisionRequest) -> DecisionResult<DecisionOutcome> {
        let capability = self
            .capability
            .as_ref()
            .ok_or_else(|| DecisionError::Unavailable("no capability configured".to_string()))?;

        if !self
            .breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_available()
        {
            return Err(DecisionError::CircuitOpen);
        }

        let result = match tokio::time::timeout(self.timeout, capability.decide(request)).await {
            Ok(result) => result,
            Err(_) => Err(DecisionError::Timeout(self.timeout)),
        };

        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) if e.counts_as_failure() => breaker.record_failure(),
            Err(_) => breaker.release_probe(),
        }
        result
    }

    /// Ask the capability; any failure is a decline
    pub async fn decide(&self, request: &DecisionRequest) -> DecisionOutcome {
        let room_id = request.room_id.as_str();
        let trigger = request.trigger;

        match self.try_decide(request).await {
            Ok(outcome) => {
                log_outcome(room_id, trigger, &outcome);
                outcome
            }
            Err(DecisionError::Unavailable(reason)) => {
                debug!(room_id, %trigger, %reason, "Decision capability unavailable, declining");
                DecisionOutcome::decline()
            }
            Err(e) => {
                warn!(room_id, %trigger, error = %e, "Decision failed, declining");
                DecisionOutcome::decline()
            }
        }
    }
}

fn log_outcome(room_id: &str, trigger: TriggerKind, outcome: &DecisionOutcome) {
    let justification = outcome.justification.as_deref().unwrap_or("");
    if outcome.decision.is_intervene() {
        info!(room_id, %trigger, justification, "Decision: intervene");
    } else {
        info!(room_id, %trigger, justification, "Decision: decline");
    }
}
