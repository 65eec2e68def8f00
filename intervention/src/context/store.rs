//! In-memory room context store
//!
//! One `Arc<Mutex<RoomContext>>` per room. The outer map lock is held only
//! to look up or replace an entry; mutations take the per-room lock so rooms
//! never contend with each other. No method here touches timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;

use super::types::{ChatMessage, ExecutionSnapshot, RoomContext};

/// Shared handle to one room's context
pub type SharedRoom = Arc<Mutex<RoomContext>>;

/// Shared reference to ContextStore
pub type SharedContextStore = Arc<ContextStore>;

/// Lock a room, recovering the data if a previous holder panicked
pub(crate) fn lock_room(room: &Mutex<RoomContext>) -> MutexGuard<'_, RoomContext> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every room's context, keyed by room id
pub struct ContextStore {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    next_epoch: AtomicU64,
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedContextStore {
        Arc::new(self)
    }

    fn fresh_context(&self, room_id: &str) -> RoomContext {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        RoomContext::new(room_id, epoch)
    }

    /// Get a room's context, creating a default one if absent
    pub fn get(&self, room_id: &str) -> SharedRoom {
        if let Some(room) = self.peek(room_id) {
            return room;
        }
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!(room_id, "Creating room context");
                Arc::new(Mutex::new(self.fresh_context(room_id)))
            })
            .clone()
    }

    /// Get a room's context without creating it
    pub fn peek(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
    }

    /// Run `f` against a room's context under its lock, creating it if absent
    pub fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomContext) -> R) -> R {
        let room = self.get(room_id);
        let mut ctx = lock_room(&room);
        f(&mut *ctx)
    }

    /// Clone of a room's current context, if it exists
    pub fn snapshot(&self, room_id: &str) -> Option<RoomContext> {
        self.peek(room_id).map(|room| lock_room(&room).clone())
    }

    /// Append a message, evicting past window capacity and stamping activity.
    ///
    /// Returns the window length after the append.
    pub fn append_message(&self, room_id: &str, message: ChatMessage) -> usize {
        self.with_room(room_id, |ctx| {
            ctx.messages.push(message);
            ctx.last_activity = Some(Utc::now());
            ctx.messages.len()
        })
    }

    /// Replace the code snapshot and language tag
    pub fn set_code(&self, room_id: &str, code: impl Into<String>, language: impl Into<String>) {
        let (code, language) = (code.into(), language.into());
        self.with_room(room_id, |ctx| {
            ctx.code = code;
            ctx.language = language;
            ctx.last_activity = Some(Utc::now());
        });
    }

    /// Replace the problem title and description
    pub fn set_problem(
        &self,
        room_id: &str,
        title: impl Into<String>,
        description: impl Into<String>,
    ) {
        let (title, description) = (title.into(), description.into());
        self.with_room(room_id, |ctx| {
            ctx.problem_title = Some(title).filter(|t| !t.is_empty());
            ctx.problem_description = Some(description).filter(|d| !d.is_empty());
        });
    }

    /// Record the latest execution result
    pub fn set_execution_result(&self, room_id: &str, snapshot: ExecutionSnapshot) {
        self.with_room(room_id, |ctx| {
            ctx.last_execution = Some(snapshot);
            ctx.last_activity = Some(Utc::now());
        });
    }

    /// Clear every field of a room, keeping the entry.
    ///
    /// The room gets a new epoch so in-flight results for the old one can be
    /// recognised and dropped. Returns the new epoch.
    pub fn reset(&self, room_id: &str) -> u64 {
        let fresh = self.fresh_context(room_id);
        let epoch = fresh.epoch;
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms.insert(room_id.to_string(), Arc::new(Mutex::new(fresh)));
        debug!(room_id, epoch, "Room context reset");
        epoch
    }

    /// Destroy a room entirely. Returns whether it existed.
    pub fn remove(&self, room_id: &str) -> bool {
        let removed = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id)
            .is_some();
        if removed {
            debug!(room_id, "Room context removed");
        }
        removed
    }

    /// Current epoch of a room, if it exists
    pub fn epoch(&self, room_id: &str) -> Option<u64> {
        self.peek(room_id).map(|room| lock_room(&room).epoch)
    }

    /// Whether `epoch` is still the live epoch of `room_id`
    pub fn is_current(&self, room_id: &str, epoch: u64) -> bool {
        self.epoch(room_id) == Some(epoch)
    }

    /// Ids of all rooms with a context
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of rooms with a context
    pub fn len(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}
