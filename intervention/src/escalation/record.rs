//! Escalation Record — what the assistant has already said
//!
//! The record holds the assistant's last utterances since the humans last
//! showed progress. Its depth is the escalation level: each delivered
//! intervention must be more concrete than the one before it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::BoundedWindow;
use crate::decision::TriggerKind;

/// Maximum utterances kept per room
pub const ESCALATION_CAPACITY: usize = 10;

/// One delivered assistant utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub trigger: TriggerKind,
    pub delivered_at: DateTime<Utc>,
}

/// Response style the next intervention should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStyle {
    /// Nothing said yet: ask a guiding question or give a light nudge
    GentleNudge,
    /// Said once: name the concept or technique that applies
    TargetedHint,
    /// Said twice: point at the specific line, branch or case
    PinpointIssue,
    /// Said three or more times: concrete example or step-by-step outline
    ConcreteSteps,
}

impl EscalationStyle {
    /// Style for a given escalation depth
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            0 => Self::GentleNudge,
            1 => Self::TargetedHint,
            2 => Self::PinpointIssue,
            _ => Self::ConcreteSteps,
        }
    }

    /// Instruction text handed to the decision capability
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::GentleNudge => {
                "First time helping on this sub-problem: ask one guiding question or give a light nudge. Do not reveal the answer."
            }
            Self::TargetedHint => {
                "You already nudged once: name the specific concept, data structure or technique that applies."
            }
            Self::PinpointIssue => {
                "You have hinted twice: point at the exact line, condition or case that is wrong or missing."
            }
            Self::ConcreteSteps => {
                "Earlier hints did not unblock them: give a small concrete example or a short step-by-step outline."
            }
        }
    }
}

impl std::fmt::Display for EscalationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GentleNudge => write!(f, "gentle_nudge"),
            Self::TargetedHint => write!(f, "targeted_hint"),
            Self::PinpointIssue => write!(f, "pinpoint_issue"),
            Self::ConcreteSteps => write!(f, "concrete_steps"),
        }
    }
}

/// Bounded list of assistant utterances plus the derived progress flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    utterances: BoundedWindow<Utterance>,
    /// Whether progress was observed since the last delivered intervention
    pub progress_observed: bool,
    /// When the record was last cleared by a progress signal
    pub last_cleared: Option<DateTime<Utc>>,
}

impl EscalationRecord {
    pub fn new() -> Self {
        Self {
            utterances: BoundedWindow::new(ESCALATION_CAPACITY),
            progress_observed: false,
            last_cleared: None,
        }
    }

    /// Append a delivered utterance, keeping only the last 10
    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
        self.progress_observed = false;
    }

    /// Forget everything said so far
    pub fn clear(&mut self, at: DateTime<Utc>) {
        self.utterances.clear();
        self.progress_observed = true;
        self.last_cleared = Some(at);
    }

    /// Current escalation level
    pub fn depth(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Style the next intervention should use
    pub fn next_style(&self) -> EscalationStyle {
        EscalationStyle::for_depth(self.depth())
    }

    /// Most recent utterance
    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.last()
    }

    /// Utterance texts, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.utterances.iter().map(|u| u.text.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.iter()
    }
}

impl Default for EscalationRecord {
    fn default() -> Self {
        Self::new()
    }
}
