//! Room state summary for debugging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::AiMode;

/// Point-in-time view of one room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStateSummary {
    pub room_id: String,
    pub has_context: bool,
    pub epoch: Option<u64>,
    pub message_count: usize,
    pub planning_check_done: bool,
    pub has_code_context: bool,
    pub has_problem_context: bool,
    pub last_assistant_response: Option<DateTime<Utc>>,
    pub session_started: bool,
    pub ai_mode: AiMode,
    pub reflection_mode: bool,
    /// Any idle-response timer, room- or user-scoped
    pub idle_armed: bool,
    pub progress_check_armed: bool,
    pub reflection_armed: bool,
    pub escalation_depth: usize,
}

impl RoomStateSummary {
    /// Summary of a room with no context
    pub fn empty(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            has_context: false,
            epoch: None,
            message_count: 0,
            planning_check_done: false,
            has_code_context: false,
            has_problem_context: false,
            last_assistant_response: None,
            session_started: false,
            ai_mode: AiMode::default(),
            reflection_mode: false,
            idle_armed: false,
            progress_check_armed: false,
            reflection_armed: false,
            escalation_depth: 0,
        }
    }
}
