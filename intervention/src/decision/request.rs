//! Decision request assembled from a room snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::TriggerKind;
use crate::context::{ChatMessage, ExecutionSnapshot, RoomContext, UserId};
use crate::escalation::EscalationStyle;
use crate::settings::GatingPolicy;

/// What the assistant has already said, condensed for the capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationBrief {
    pub depth: usize,
    pub style: EscalationStyle,
    /// Earlier utterances, oldest first; the capability must not repeat them
    pub previous: Vec<String>,
}

impl EscalationBrief {
    pub fn last(&self) -> Option<&str> {
        self.previous.last().map(String::as_str)
    }
}

/// Everything the decision capability is given for one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub room_id: String,
    pub trigger: TriggerKind,
    pub assistant_name: String,
    /// Participant the answer goes to in individual mode
    pub target_user: Option<UserId>,
    pub recent_messages: Vec<ChatMessage>,
    pub code: String,
    pub language: String,
    pub problem_title: Option<String>,
    pub problem_description: Option<String>,
    /// Only set when the run is recent enough to matter
    pub execution: Option<ExecutionSnapshot>,
    pub escalation: EscalationBrief,
    pub requested_at: DateTime<Utc>,
}

impl DecisionRequest {
    /// Build a request from a room snapshot
    pub fn from_context(
        ctx: &RoomContext,
        trigger: TriggerKind,
        policy: &GatingPolicy,
        now: DateTime<Utc>,
        assistant_name: &str,
    ) -> Self {
        let window = chrono::Duration::from_std(policy.execution_context_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let execution = ctx
            .last_execution
            .as_ref()
            .filter(|exec| exec.is_recent(now, window))
            .cloned();

        Self {
            room_id: ctx.room_id.clone(),
            trigger,
            assistant_name: assistant_name.to_string(),
            target_user: None,
            recent_messages: ctx
                .messages
                .tail(policy.recent_messages_in_request)
                .cloned()
                .collect(),
            code: ctx.code.clone(),
            language: ctx.language.clone(),
            problem_title: ctx.problem_title.clone(),
            problem_description: ctx.problem_description.clone(),
            execution,
            escalation: EscalationBrief {
                depth: ctx.escalation.depth(),
                style: ctx.escalation.next_style(),
                previous: ctx.escalation.texts(),
            },
            requested_at: now,
        }
    }

    pub fn with_target_user(mut self, user_id: Option<UserId>) -> Self {
        self.target_user = user_id;
        self
    }

    /// Conversation rendered as `name: text` lines
    pub fn transcript(&self) -> String {
        self.recent_messages
            .iter()
            .map(|m| format!("{}: {}", m.username, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Last human message in the window
    pub fn last_human_message(&self) -> Option<&ChatMessage> {
        self.recent_messages.iter().rev().find(|m| !m.is_assistant)
    }
}
