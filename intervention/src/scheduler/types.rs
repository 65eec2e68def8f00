//! Timer keys, handles and fire commands

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::{RoomId, UserId};

/// The three independent delayed-action classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerClass {
    /// Idle-response: re-armed by every qualifying message
    Idle,
    /// Progress-check heartbeat: armed once, never re-armed by messages
    ProgressCheck,
    /// Reflection-response: fixed delay while in reflection mode
    Reflection,
}

impl TimerClass {
    pub const ALL: [TimerClass; 3] = [Self::Idle, Self::ProgressCheck, Self::Reflection];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ProgressCheck => "progress_check",
            Self::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for TimerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one slot: at most one live timer exists per key.
///
/// `user_id` is set only for user-scoped idle timers in individual mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerKey {
    pub room_id: RoomId,
    pub user_id: Option<UserId>,
    pub class: TimerClass,
}

impl TimerKey {
    /// Room-scoped key
    pub fn room(room_id: impl Into<RoomId>, class: TimerClass) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: None,
            class,
        }
    }

    /// User-scoped key (`room+user`)
    pub fn user(room_id: impl Into<RoomId>, user_id: impl Into<UserId>, class: TimerClass) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: Some(user_id.into()),
            class,
        }
    }

    pub fn scoped(room_id: impl Into<RoomId>, user_id: Option<UserId>, class: TimerClass) -> Self {
        Self {
            room_id: room_id.into(),
            user_id,
            class,
        }
    }
}

impl std::fmt::Display for TimerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user_id {
            Some(user) => write!(f, "{}+{}/{}", self.room_id, user, self.class),
            None => write!(f, "{}/{}", self.room_id, self.class),
        }
    }
}

/// One outstanding delayed action
#[derive(Debug, Clone)]
pub struct TimerHandle {
    pub key: TimerKey,
    /// Unique per arm; distinguishes a replacement from the timer it replaced
    pub id: u64,
    pub deadline: Instant,
    /// Room epoch at arm time
    pub epoch: u64,
    pub token: CancellationToken,
}

impl TimerHandle {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Command emitted when a timer commits to firing.
///
/// Carries everything the fire handler needs, so freshness checks work on
/// data rather than on state captured at arm time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub key: TimerKey,
    pub id: u64,
    pub epoch: u64,
    pub deadline: Instant,
}
