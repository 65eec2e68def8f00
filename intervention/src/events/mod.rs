//! Outward event stream
//!
//! Observers (operators, dashboards, tests) subscribe to the engine's
//! [`EventBus`] to see interventions, declines, timer activity and resets
//! without going through the messaging port.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::AssistantEvent;
