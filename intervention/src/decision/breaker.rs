//! Circuit breaker for the decision capability.
//!
//! Counts consecutive failures. Once the threshold is reached the circuit
//! *opens* and calls are skipped (treated as a decline). After the cooldown
//! the circuit is *half-open* and one probe is let through; a success closes
//! it again, another failure restarts the cooldown.

use std::time::Duration;

use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy, calls allowed
    Closed,
    /// Tripped, calls blocked until the cooldown expires
    Open,
    /// Cooldown expired, a probe call is allowed
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// A half-open probe has been let through and not reported yet
    probe_in_flight: bool,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time after the last failure before Open becomes HalfOpen
    pub cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            probe_in_flight: false,
            failure_threshold,
            cooldown,
        }
    }

    /// Record a success, closing the circuit
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.probe_in_flight = false;
    }

    /// Record a failure, which may open the circuit
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
        self.probe_in_flight = false;
    }

    /// Forget an unreported probe, for outcomes that are neither success
    /// nor failure
    pub fn release_probe(&mut self) {
        self.probe_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        if self.consecutive_failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        match self.last_failure {
            Some(at) if at.elapsed() < self.cooldown => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Whether a call may go through.
    ///
    /// Always when Closed. When HalfOpen only the first caller gets through;
    /// the rest are refused until that probe is recorded.
    pub fn is_available(&mut self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen if self.probe_in_flight => false,
            CircuitState::HalfOpen => {
                self.probe_in_flight = true;
                true
            }
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}
