//! Outward events published by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ExecutionSnapshot, RoomId, UserId};
use crate::decision::TriggerKind;
use crate::scheduler::TimerClass;
use crate::settings::InterventionSettings;

/// Everything observers can learn about the assistant's behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// The assistant said something
    Intervened {
        room_id: RoomId,
        /// Set when the message went to a single participant
        user_id: Option<UserId>,
        text: String,
        trigger_kind: TriggerKind,
        escalation_depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// The capability was consulted and declined
    Declined {
        room_id: RoomId,
        trigger_kind: TriggerKind,
        justification: Option<String>,
        timestamp: DateTime<Utc>,
    },

    TimerArmed {
        room_id: RoomId,
        user_id: Option<UserId>,
        class: TimerClass,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TimerCancelled {
        room_id: RoomId,
        user_id: Option<UserId>,
        class: TimerClass,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Room context cleared by a session reset
    RoomReset {
        room_id: RoomId,
        epoch: u64,
        timestamp: DateTime<Utc>,
    },

    /// Last participant left; the room and its timers are gone
    RoomClosed {
        room_id: RoomId,
        timestamp: DateTime<Utc>,
    },

    /// Hand-off to the execution-analysis collaborator
    ExecutionAnalysisRequested {
        room_id: RoomId,
        snapshot: ExecutionSnapshot,
        timestamp: DateTime<Utc>,
    },

    SettingsUpdated {
        settings: InterventionSettings,
        timestamp: DateTime<Utc>,
    },
}

impl AssistantEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Intervened { timestamp, .. }
            | Self::Declined { timestamp, .. }
            | Self::TimerArmed { timestamp, .. }
            | Self::TimerCancelled { timestamp, .. }
            | Self::RoomReset { timestamp, .. }
            | Self::RoomClosed { timestamp, .. }
            | Self::ExecutionAnalysisRequested { timestamp, .. }
            | Self::SettingsUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Event type string as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Intervened { .. } => "intervened",
            Self::Declined { .. } => "declined",
            Self::TimerArmed { .. } => "timer_armed",
            Self::TimerCancelled { .. } => "timer_cancelled",
            Self::RoomReset { .. } => "room_reset",
            Self::RoomClosed { .. } => "room_closed",
            Self::ExecutionAnalysisRequested { .. } => "execution_analysis_requested",
            Self::SettingsUpdated { .. } => "settings_updated",
        }
    }

    /// Room the event belongs to, if any
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::Intervened { room_id, .. }
            | Self::Declined { room_id, .. }
            | Self::TimerArmed { room_id, .. }
            | Self::TimerCancelled { room_id, .. }
            | Self::RoomReset { room_id, .. }
            | Self::RoomClosed { room_id, .. }
            | Self::ExecutionAnalysisRequested { room_id, .. } => Some(room_id),
            Self::SettingsUpdated { .. } => None,
        }
    }
}
