//! Messaging port — how deliveries leave the core
//!
//! Transport and fan-out belong to the session collaborator. The engine only
//! needs three calls, and never holds a room lock while making them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{RoomId, UserId};
use crate::decision::TriggerKind;
use crate::error::{InterventionError, InterventionResult};

/// Event name for ordinary assistant chat messages
pub const CHAT_MESSAGE_EVENT: &str = "chat_message";
/// Event name for progress-check interventions
pub const PROGRESS_NOTIFICATION_EVENT: &str = "progress_notification";
/// Event name for reflection-mode responses
pub const REFLECTION_MESSAGE_EVENT: &str = "reflection_message";

/// Event name used for a trigger's delivery
pub fn event_for(trigger: TriggerKind) -> &'static str {
    match trigger {
        TriggerKind::ProgressCheck => PROGRESS_NOTIFICATION_EVENT,
        TriggerKind::Reflection => REFLECTION_MESSAGE_EVENT,
        _ => CHAT_MESSAGE_EVENT,
    }
}

/// Payload of an intervention delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionDelivery {
    pub id: String,
    pub room_id: RoomId,
    pub text: String,
    pub trigger_kind: TriggerKind,
    /// Assistant identity as shown to participants
    pub username: String,
    pub user_id: UserId,
    /// Recipient in individual mode
    pub target_user: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub is_auto_generated: bool,
}

/// Collaborator that owns room membership and fan-out.
///
/// Implementations must not block; queue the payload and return.
pub trait MessagingPort: Send + Sync {
    fn broadcast(
        &self,
        room_id: &str,
        event: &str,
        payload: serde_json::Value,
        exclude_sender: Option<&str>,
    ) -> InterventionResult<()>;

    fn room_member_count(&self, room_id: &str) -> usize;

    fn deliver_to_user(
        &self,
        user_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> InterventionResult<()>;
}

/// Where a recorded message went
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Room {
        room_id: String,
        exclude_sender: Option<String>,
    },
    User {
        user_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: Recipient,
    pub event: String,
    pub payload: serde_json::Value,
}

impl SentMessage {
    /// Decode the payload as an intervention delivery
    pub fn delivery(&self) -> Option<InterventionDelivery> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// In-memory port that records everything sent through it
#[derive(Debug, Default)]
pub struct RecordingPort {
    sent: Mutex<Vec<SentMessage>>,
    members: Mutex<HashMap<String, usize>>,
    /// When set every send is refused and nothing is recorded
    failing: AtomicBool,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member_count(&self, room_id: &str, count: usize) {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room_id.to_string(), count);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Intervention deliveries, in send order
    pub fn deliveries(&self) -> Vec<InterventionDelivery> {
        self.sent().iter().filter_map(SentMessage::delivery).collect()
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every following send fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, message: SentMessage) -> InterventionResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InterventionError::messaging(format!(
                "transport refused {}",
                message.event
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

impl MessagingPort for RecordingPort {
    fn broadcast(
        &self,
        room_id: &str,
        event: &str,
        payload: serde_json::Value,
        exclude_sender: Option<&str>,
    ) -> InterventionResult<()> {
        self.record(SentMessage {
            recipient: Recipient::Room {
                room_id: room_id.to_string(),
                exclude_sender: exclude_sender.map(String::from),
            },
            event: event.to_string(),
            payload,
        })
    }

    fn room_member_count(&self, room_id: &str) -> usize {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .copied()
            .unwrap_or(0)
    }

    fn deliver_to_user(
        &self,
        user_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> InterventionResult<()> {
        self.record(SentMessage {
            recipient: Recipient::User {
                user_id: user_id.to_string(),
            },
            event: event.to_string(),
            payload,
        })
    }
}
