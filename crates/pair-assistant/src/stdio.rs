//! JSON-lines stdio transport
//!
//! Each inbound line is either a control command (`{"command": ...}`) or an
//! activity signal (`{"type": ...}`). Everything the engine sends out is
//! written to stdout as one JSON object per line, tagged with `kind`.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use pair_intervention::{
    ActivitySignal, AssistantEvent, InterventionError, InterventionResult, InterventionSettings,
    MessagingPort, RoomStateSummary, SettingsUpdate,
};
use serde::{Deserialize, Serialize};

/// Operator commands accepted on stdin
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    UpdateSettings {
        settings: SettingsUpdate,
    },
    RoomSummary {
        room_id: String,
    },
    Shutdown,
}

/// One parsed line of input
#[derive(Debug, Clone)]
pub enum Inbound {
    Control(ControlCommand),
    Signal(ActivitySignal),
}

/// Parse one input line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<Inbound>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(line)?;
    let inbound = if value.get("command").is_some() {
        Inbound::Control(serde_json::from_value(value)?)
    } else {
        Inbound::Signal(serde_json::from_value(value)?)
    };
    Ok(Some(inbound))
}

/// Lines written to stdout
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound<'a> {
    Broadcast {
        room_id: &'a str,
        event: &'a str,
        payload: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        exclude_sender: Option<&'a str>,
    },
    Direct {
        user_id: &'a str,
        event: &'a str,
        payload: serde_json::Value,
    },
    Settings {
        settings: &'a InterventionSettings,
    },
    RoomSummary {
        summary: &'a RoomStateSummary,
    },
    Event {
        event: &'a AssistantEvent,
    },
    Error {
        message: String,
    },
}

/// Messaging port that writes to stdout and tracks room membership from the
/// participant signals it is shown
#[derive(Debug, Default)]
pub struct StdioPort {
    members: Mutex<HashMap<String, HashSet<String>>>,
}

impl StdioPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update membership before the signal reaches the engine
    pub fn observe(&self, signal: &ActivitySignal) {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        match signal {
            ActivitySignal::ParticipantJoined { room_id, user_id } => {
                members
                    .entry(room_id.clone())
                    .or_default()
                    .insert(user_id.clone());
            }
            ActivitySignal::ParticipantLeft { room_id, user_id } => {
                if let Some(room) = members.get_mut(room_id) {
                    room.remove(user_id);
                    if room.is_empty() {
                        members.remove(room_id);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn emit(&self, line: &Outbound<'_>) -> InterventionResult<()> {
        let mut json = serde_json::to_vec(line)?;
        json.push(b'\n');

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&json)
            .and_then(|_| stdout.flush())
            .map_err(|e| InterventionError::messaging(format!("stdout write failed: {}", e)))
    }
}

impl MessagingPort for StdioPort {
    fn broadcast(
        &self,
        room_id: &str,
        event: &str,
        payload: serde_json::Value,
        exclude_sender: Option<&str>,
    ) -> InterventionResult<()> {
        self.emit(&Outbound::Broadcast {
            room_id,
            event,
            payload,
            exclude_sender,
        })
    }

    fn room_member_count(&self, room_id: &str) -> usize {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    fn deliver_to_user(
        &self,
        user_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> InterventionResult<()> {
        self.emit(&Outbound::Direct {
            user_id,
            event,
            payload,
        })
    }
}
