//! Core types for per-room context
//!
//! Everything the assistant knows about a room lives in one `RoomContext`:
//! the recent message window, the code and problem snapshot, the last
//! execution, session flags and the escalation record.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::EscalationRecord;

/// Unique identifier for rooms
pub type RoomId = String;

/// Unique identifier for participants
pub type UserId = String;

/// Capacity of the per-room message window
pub const MESSAGE_WINDOW_CAPACITY: usize = 10;

/// Default language tag for a fresh room
pub const DEFAULT_LANGUAGE: &str = "python";

/// FIFO window that never grows past its capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedWindow<T> {
    /// Create an empty window
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item, evicting the oldest ones past capacity.
    ///
    /// Returns how many items were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Most recently pushed item
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` items, oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }
}

/// A chat message in a room, human or assistant-authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// True for messages the assistant produced
    #[serde(default)]
    pub is_assistant: bool,
}

impl ChatMessage {
    /// Create a human message stamped now
    pub fn new(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
            is_assistant: false,
        }
    }

    /// Create an assistant-authored message stamped now
    pub fn assistant(agent_id: &str, agent_name: &str, content: impl Into<String>) -> Self {
        Self {
            is_assistant: true,
            ..Self::new(agent_id, agent_name, content)
        }
    }
}

/// Result of the most recent code execution in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub code: String,
    /// Standard output
    #[serde(default)]
    pub output: String,
    /// Standard error or interpreter error, if any
    #[serde(default)]
    pub error: Option<String>,
    pub success: bool,
    #[serde(default, alias = "durationMs")]
    pub duration_ms: u64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ExecutionSnapshot {
    /// Whether the run succeeded without any error text
    pub fn is_clean_success(&self) -> bool {
        self.success
            && self
                .error
                .as_deref()
                .map(|e| e.trim().is_empty())
                .unwrap_or(true)
    }

    /// Whether the run happened within `window` of `now`
    pub fn is_recent(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= window
    }
}

/// How the assistant participates in a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    /// One assistant for the whole room
    #[default]
    Shared,
    /// A personal assistant per participant
    Individual,
    /// Assistant switched off
    None,
}

impl std::fmt::Display for AiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Individual => write!(f, "individual"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Session flags, independent of message content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub started: bool,
    pub ai_mode: AiMode,
}

/// All state the assistant keeps for one room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomContext {
    pub room_id: RoomId,
    /// Changes whenever the room is reset; used to discard stale results
    pub epoch: u64,
    pub messages: BoundedWindow<ChatMessage>,
    pub code: String,
    pub language: String,
    pub problem_title: Option<String>,
    pub problem_description: Option<String>,
    pub last_execution: Option<ExecutionSnapshot>,
    pub last_assistant_response: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    /// One-shot planning check already performed
    pub planning_check_done: bool,
    pub reflection_mode: bool,
    pub session: SessionState,
    pub escalation: EscalationRecord,
}

impl RoomContext {
    /// Create an empty context for a room
    pub fn new(room_id: impl Into<RoomId>, epoch: u64) -> Self {
        Self {
            room_id: room_id.into(),
            epoch,
            messages: BoundedWindow::new(MESSAGE_WINDOW_CAPACITY),
            code: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            problem_title: None,
            problem_description: None,
            last_execution: None,
            last_assistant_response: None,
            last_activity: None,
            planning_check_done: false,
            reflection_mode: false,
            session: SessionState::default(),
            escalation: EscalationRecord::new(),
        }
    }

    /// Number of human-authored messages in the window
    pub fn human_message_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_assistant).count()
    }

    /// Whether a problem title or description is set
    pub fn has_problem(&self) -> bool {
        self.problem_title.is_some() || self.problem_description.is_some()
    }

    /// Time since the assistant last spoke, if it ever did
    pub fn since_last_response(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_assistant_response
            .map(|t| now.signed_duration_since(t))
    }
}
