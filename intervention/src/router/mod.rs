//! Activity Signal Router
//!
//! Maps every inbound signal to context mutations and timer cancel/arm
//! operations, and runs the decisions those timers lead to.
//!
//! | Signal                       | Effect                                                        |
//! |------------------------------|---------------------------------------------------------------|
//! | chat message                 | append; cancel idle; re-arm idle; arm progress-check if idle  |
//! | chat message (mention)       | append; cancel idle, reflection; decide now with fallback     |
//! | chat message (reflection)    | append; arm reflection-response only                         |
//! | code update                  | set code; cancel idle (room, and room+user if individual)     |
//! | voice activity / typing      | cancel idle for the room or room+user, no re-arm              |
//! | execution result             | set snapshot; progress check; request analysis                |
//! | session start                | started = true; clear escalation; greet after a short delay   |
//! | reflection started           | cancel idle; deliver the opening question                     |
//! | session reset                | clear the context under a new epoch; cancel every timer       |

pub mod engine;
pub mod mention;
pub mod signal;
pub mod summary;

pub use engine::{
    EngineConfig, InterventionEngine, ASSISTANT_USER_ID, DIRECT_MENTION_FALLBACK,
    REFLECTION_FALLBACK, SESSION_GREETING,
};
pub use mention::MentionDetector;
pub use signal::ActivitySignal;
pub use summary::RoomStateSummary;
