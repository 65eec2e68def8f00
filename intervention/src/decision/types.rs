//! Decision types
//!
//! The capability boundary is a tagged union: either the assistant stays
//! quiet or it says something specific.

use serde::{Deserialize, Serialize};

/// Why a decision is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Idle-response timer fired
    Idle,
    /// A message addressed the assistant directly
    DirectMention,
    /// Progress-check heartbeat fired
    ProgressCheck,
    /// Reflection-response timer fired
    Reflection,
    /// First code written in the room
    Planning,
    /// Fixed welcome after a session starts; never sent to the capability
    Greeting,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DirectMention => "direct_mention",
            Self::ProgressCheck => "progress_check",
            Self::Reflection => "reflection",
            Self::Planning => "planning",
            Self::Greeting => "greeting",
        }
    }

    /// Whether a delivery for this trigger counts toward escalation depth
    pub fn escalates(&self) -> bool {
        !matches!(self, Self::Reflection | Self::Greeting)
    }

    /// Whether the request should carry the escalation style hint
    pub fn uses_escalation_style(&self) -> bool {
        matches!(self, Self::Idle | Self::DirectMention)
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the assistant should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Decline,
    Intervene { text: String },
}

impl Decision {
    /// Intervene with `text`, or decline if it is blank
    pub fn intervene(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            Self::Decline
        } else {
            Self::Intervene {
                text: text.trim().to_string(),
            }
        }
    }

    pub fn is_intervene(&self) -> bool {
        matches!(self, Self::Intervene { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Intervene { text } => Some(text),
            Self::Decline => None,
        }
    }
}

/// A decision plus the capability's short justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    /// Logged only; never shown to participants
    #[serde(default)]
    pub justification: Option<String>,
}

impl DecisionOutcome {
    pub fn decline() -> Self {
        Self {
            decision: Decision::Decline,
            justification: None,
        }
    }

    pub fn intervene(text: impl Into<String>) -> Self {
        Self {
            decision: Decision::intervene(text),
            justification: None,
        }
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }
}

impl From<Decision> for DecisionOutcome {
    fn from(decision: Decision) -> Self {
        Self {
            decision,
            justification: None,
        }
    }
}
