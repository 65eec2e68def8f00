//! Shared fixtures: a scripted decision capability and an engine harness.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pair_intervention::decision::DecisionResult;
use pair_intervention::{
    ActivitySignal, ChatMessage, DecisionAdapter, DecisionCapability, DecisionOutcome,
    DecisionRequest, EngineConfig, InterventionEngine, RecordingPort, TriggerKind,
};
use tokio::time::Instant;

/// One recorded capability call
#[derive(Debug, Clone)]
pub struct Call {
    pub room_id: String,
    pub trigger: TriggerKind,
    pub at: Instant,
    pub escalation_depth: usize,
    pub previous: Vec<String>,
    pub target_user: Option<String>,
}

/// Capability that replays a script, then falls back to a default outcome
pub struct ScriptedCapability {
    script: Mutex<VecDeque<DecisionOutcome>>,
    default: DecisionOutcome,
    latency: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedCapability {
    pub fn always(outcome: DecisionOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: outcome,
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn intervening(text: &str) -> Self {
        Self::always(DecisionOutcome::intervene(text))
    }

    pub fn declining() -> Self {
        Self::always(DecisionOutcome::decline())
    }

    pub fn with_script(self, outcomes: Vec<DecisionOutcome>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, trigger: TriggerKind) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.trigger == trigger)
            .collect()
    }
}

#[async_trait]
impl DecisionCapability for ScriptedCapability {
    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<DecisionOutcome> {
        self.calls.lock().unwrap().push(Call {
            room_id: request.room_id.clone(),
            trigger: request.trigger,
            at: Instant::now(),
            escalation_depth: request.escalation.depth,
            previous: request.escalation.previous.clone(),
            target_user: request.target_user.clone(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct Harness {
    pub engine: Arc<InterventionEngine>,
    pub port: Arc<RecordingPort>,
    pub capability: Arc<ScriptedCapability>,
}

impl Harness {
    pub fn start(capability: ScriptedCapability) -> Self {
        Self::start_with(capability, EngineConfig::default())
    }

    pub fn start_with(capability: ScriptedCapability, config: EngineConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("pair_intervention=debug")
            .try_init();

        let capability = Arc::new(capability);
        let port = Arc::new(RecordingPort::new());
        let adapter = DecisionAdapter::new(Some(capability.clone()));
        let engine = InterventionEngine::start(config, adapter, port.clone()).unwrap();
        Self {
            engine,
            port,
            capability,
        }
    }

    pub fn say(&self, room: &str, user: &str, text: &str) {
        self.engine
            .handle(ActivitySignal::ChatMessage {
                room_id: room.to_string(),
                message: ChatMessage::new(user, user, text),
            })
            .unwrap();
    }

    pub fn signal(&self, signal: ActivitySignal) {
        self.engine.handle(signal).unwrap();
    }
}

/// Let spawned tasks run without moving the clock meaningfully
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub async fn advance(secs_f: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs_f)).await;
}
