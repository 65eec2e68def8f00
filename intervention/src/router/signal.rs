//! Inbound activity signals
//!
//! Internally tagged on `type`, snake_case, one variant per external event
//! the router understands.

use serde::{Deserialize, Serialize};

use crate::context::{AiMode, ChatMessage, ExecutionSnapshot, RoomId, UserId, DEFAULT_LANGUAGE};

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivitySignal {
    ChatMessage {
        room_id: RoomId,
        message: ChatMessage,
    },

    CodeUpdate {
        room_id: RoomId,
        code: String,
        #[serde(default = "default_language")]
        language: String,
        #[serde(default)]
        user_id: Option<UserId>,
    },

    ProblemUpdate {
        room_id: RoomId,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
    },

    VoiceActivityStart {
        room_id: RoomId,
        #[serde(default)]
        user_id: Option<UserId>,
    },

    TypingStart {
        room_id: RoomId,
        #[serde(default)]
        user_id: Option<UserId>,
    },

    ExecutionResult {
        room_id: RoomId,
        snapshot: ExecutionSnapshot,
    },

    SessionStart {
        room_id: RoomId,
    },

    SessionReset {
        room_id: RoomId,
    },

    ReflectionStarted {
        room_id: RoomId,
    },

    ReflectionEnded {
        room_id: RoomId,
    },

    SetAiMode {
        room_id: RoomId,
        mode: AiMode,
    },

    ParticipantJoined {
        room_id: RoomId,
        user_id: UserId,
    },

    ParticipantLeft {
        room_id: RoomId,
        user_id: UserId,
    },
}

impl ActivitySignal {
    pub fn room_id(&self) -> &str {
        match self {
            Self::ChatMessage { room_id, .. }
            | Self::CodeUpdate { room_id, .. }
            | Self::ProblemUpdate { room_id, .. }
            | Self::VoiceActivityStart { room_id, .. }
            | Self::TypingStart { room_id, .. }
            | Self::ExecutionResult { room_id, .. }
            | Self::SessionStart { room_id }
            | Self::SessionReset { room_id }
            | Self::ReflectionStarted { room_id }
            | Self::ReflectionEnded { room_id }
            | Self::SetAiMode { room_id, .. }
            | Self::ParticipantJoined { room_id, .. }
            | Self::ParticipantLeft { room_id, .. } => room_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::CodeUpdate { .. } => "code_update",
            Self::ProblemUpdate { .. } => "problem_update",
            Self::VoiceActivityStart { .. } => "voice_activity_start",
            Self::TypingStart { .. } => "typing_start",
            Self::ExecutionResult { .. } => "execution_result",
            Self::SessionStart { .. } => "session_start",
            Self::SessionReset { .. } => "session_reset",
            Self::ReflectionStarted { .. } => "reflection_started",
            Self::ReflectionEnded { .. } => "reflection_ended",
            Self::SetAiMode { .. } => "set_ai_mode",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
        }
    }
}
