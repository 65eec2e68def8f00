//! Escalation — how much the assistant has already said
//!
//! Tracks the assistant's own utterances per room so each intervention on the
//! same sub-problem gets more concrete, and resets the ladder when the humans
//! make progress on their own.
//!
//! # Escalation Ladder
//!
//! ```text
//! depth 0  GentleNudge     guiding question, no answer
//!     │
//! depth 1  TargetedHint    name the concept that applies
//!     │
//! depth 2  PinpointIssue   point at the exact line or case
//!     │
//! depth 3+ ConcreteSteps   small example or step-by-step outline
//!
//! Progress signal (clean run < 2 min, "works"/"fixed"/..., 5 min without help)
//!     └─▶ record cleared, back to depth 0
//! ```

pub mod progress;
pub mod record;
pub mod tracker;

pub use progress::{progress_keyword, ProgressConfig, ProgressDetector, ProgressKind, ProgressSignal};
pub use record::{EscalationRecord, EscalationStyle, Utterance, ESCALATION_CAPACITY};
pub use tracker::EscalationTracker;
