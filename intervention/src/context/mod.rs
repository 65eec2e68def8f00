//! Room context store
//!
//! Pure data plus accessors: the recent message window, code and problem
//! snapshot, last execution, session flags and escalation record of every
//! active room. Timer side effects are the router's job.

pub mod store;
pub mod types;

pub use store::{ContextStore, SharedContextStore, SharedRoom};
pub use types::{
    AiMode, BoundedWindow, ChatMessage, ExecutionSnapshot, RoomContext, RoomId, SessionState,
    UserId, DEFAULT_LANGUAGE, MESSAGE_WINDOW_CAPACITY,
};

pub(crate) use store::lock_room;
