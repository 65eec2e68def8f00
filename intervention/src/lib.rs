//! Pair Intervention Library
//!
//! Decides, per room, when an assistant participant in a live coding session
//! may speak and what it should say, given a continuous stream of activity
//! signals (chat messages, code edits, voice and typing activity, execution
//! results).
//!
//! # Components
//!
//! - **Room Context Store** (`context`): per-room message window, code and
//!   problem snapshot, last execution, session flags
//! - **Escalation Tracker** (`escalation`): what the assistant already said,
//!   reset when the humans make progress on their own
//! - **Decision Capability** (`decision`): black-box "decline or intervene"
//!   service behind a timeout and circuit breaker
//! - **Timer Scheduler** (`scheduler`): at most one live delayed action per
//!   room, timer class and user scope
//! - **Activity Signal Router** (`router`): maps signals to context mutations
//!   and timer operations, and runs fired timers
//!
//! # Data Flow
//!
//! ```text
//! signal ──▶ InterventionEngine::handle ──▶ ContextStore + TimerScheduler
//!                                                  │ fire
//!                                                  ▼
//!                                  DecisionAdapter ──▶ MessagingPort + EventBus
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pair_intervention::{
//!     ActivitySignal, ChatMessage, DecisionAdapter, EngineConfig, InterventionEngine,
//!     RecordingPort,
//! };
//! use std::sync::Arc;
//!
//! let engine = InterventionEngine::start(
//!     EngineConfig::default(),
//!     DecisionAdapter::unavailable(),
//!     Arc::new(RecordingPort::new()),
//! )?;
//! engine.handle(ActivitySignal::ChatMessage {
//!     room_id: "room-1".into(),
//!     message: ChatMessage::new("u1", "Alice", "how do we start?"),
//! })?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod context;
pub mod decision;
pub mod error;
pub mod escalation;
pub mod events;
pub mod messaging;
pub mod router;
pub mod scheduler;
pub mod settings;

pub use context::{AiMode, ChatMessage, ContextStore, ExecutionSnapshot, RoomContext};
pub use decision::{
    CapabilityConfig, Decision, DecisionAdapter, DecisionCapability, DecisionError,
    DecisionOutcome, DecisionRequest, OpenAiCapability, TriggerKind,
};
pub use error::{InterventionError, InterventionResult};
pub use escalation::{EscalationRecord, EscalationStyle, EscalationTracker};
pub use events::{AssistantEvent, EventBus, EventFilter};
pub use messaging::{InterventionDelivery, MessagingPort, RecordingPort};
pub use router::{ActivitySignal, EngineConfig, InterventionEngine, RoomStateSummary};
pub use scheduler::{TimerClass, TimerKey, TimerScheduler};
pub use settings::{GatingPolicy, InterventionSettings, SettingsUpdate};
