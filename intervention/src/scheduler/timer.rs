//! Timer Scheduler — one live delayed action per key
//!
//! Every armed timer is a tokio task racing its deadline against a
//! cancellation token. The live map is the single source of truth: a timer
//! only fires if, under the map lock, its id is still the one registered for
//! its key. Cancel and fire therefore serialize on the same lock and a
//! cancelled or replaced timer can never fire.
//!
//! Firing removes the key *before* the fire command is sent, so whatever
//! happens while processing it the key is already un-armed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::types::{FiredTimer, TimerClass, TimerHandle, TimerKey};

#[derive(Debug)]
struct LiveTimer {
    id: u64,
    epoch: u64,
    deadline: Instant,
    token: CancellationToken,
}

type LiveMap = Arc<Mutex<HashMap<TimerKey, LiveTimer>>>;

fn lock_live(live: &Mutex<HashMap<TimerKey, LiveTimer>>) -> MutexGuard<'_, HashMap<TimerKey, LiveTimer>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every live timer across all rooms
pub struct TimerScheduler {
    live: LiveMap,
    next_id: AtomicU64,
    fired_tx: mpsc::UnboundedSender<FiredTimer>,
}

impl TimerScheduler {
    /// Create a scheduler and the receiver its fire commands arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTimer>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            live: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Arm a timer for `key`, replacing any live one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, key: TimerKey, delay: Duration, epoch: u64) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        let token = CancellationToken::new();

        let replaced = lock_live(&self.live).insert(
            key.clone(),
            LiveTimer {
                id,
                epoch,
                deadline,
                token: token.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.token.cancel();
            trace!(key = %key, previous_id = previous.id, "Replaced live timer");
        }

        debug!(
            room_id = %key.room_id,
            user_id = ?key.user_id,
            class = %key.class,
            delay_ms = delay.as_millis() as u64,
            epoch,
            "Timer armed"
        );

        let live = Arc::clone(&self.live);
        let fired_tx = self.fired_tx.clone();
        let task_key = key.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if commit_fire(&live, &task_key, id) {
                        // Receiver gone means the engine shut down
                        let _ = fired_tx.send(FiredTimer {
                            key: task_key,
                            id,
                            epoch,
                            deadline,
                        });
                    }
                }
            }
        });

        TimerHandle {
            key,
            id,
            deadline,
            epoch,
            token,
        }
    }

    /// Cancel the live timer for `key`. Returns whether one was live.
    pub fn cancel(&self, key: &TimerKey, reason: &str) -> bool {
        let removed = lock_live(&self.live).remove(key);
        match removed {
            Some(timer) => {
                timer.token.cancel();
                debug!(
                    room_id = %key.room_id,
                    user_id = ?key.user_id,
                    class = %key.class,
                    reason,
                    "Timer cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Cancel the timer behind `handle`, unless it has since been replaced.
    /// Returns whether it was still live.
    pub fn cancel_handle(&self, handle: &TimerHandle, reason: &str) -> bool {
        let removed = {
            let mut live = lock_live(&self.live);
            match live.get(&handle.key) {
                Some(timer) if timer.id == handle.id => live.remove(&handle.key),
                _ => None,
            }
        };
        match removed {
            Some(timer) => {
                timer.token.cancel();
                debug!(
                    room_id = %handle.key.room_id,
                    class = %handle.key.class,
                    id = handle.id,
                    reason,
                    "Timer withdrawn"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        lock_live(&self.live).contains_key(key)
    }

    /// Deadline of the live timer for `key`
    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        lock_live(&self.live).get(key).map(|t| t.deadline)
    }

    /// Epoch the live timer for `key` was armed under
    pub fn armed_epoch(&self, key: &TimerKey) -> Option<u64> {
        lock_live(&self.live).get(key).map(|t| t.epoch)
    }

    /// Cancel every matching timer, returning the keys that were live
    fn cancel_where(&self, reason: &str, predicate: impl Fn(&TimerKey) -> bool) -> Vec<TimerKey> {
        let mut cancelled = Vec::new();
        lock_live(&self.live).retain(|key, timer| {
            if predicate(key) {
                timer.token.cancel();
                cancelled.push(key.clone());
                false
            } else {
                true
            }
        });
        for key in &cancelled {
            debug!(
                room_id = %key.room_id,
                user_id = ?key.user_id,
                class = %key.class,
                reason,
                "Timer cancelled"
            );
        }
        cancelled
    }

    /// Cancel all timers of a room, every class and user scope
    pub fn cancel_room(&self, room_id: &str, reason: &str) -> Vec<TimerKey> {
        self.cancel_where(reason, |key| key.room_id == room_id)
    }

    /// Cancel all timers of a class in every room
    pub fn cancel_class(&self, class: TimerClass, reason: &str) -> Vec<TimerKey> {
        self.cancel_where(reason, |key| key.class == class)
    }

    /// Cancel all timers of one class in one room, any user scope
    pub fn cancel_room_class(&self, room_id: &str, class: TimerClass, reason: &str) -> Vec<TimerKey> {
        self.cancel_where(reason, |key| key.room_id == room_id && key.class == class)
    }

    /// Live keys of a room
    pub fn armed_keys(&self, room_id: &str) -> Vec<TimerKey> {
        lock_live(&self.live)
            .keys()
            .filter(|key| key.room_id == room_id)
            .cloned()
            .collect()
    }

    /// Number of live timers across all rooms
    pub fn live_count(&self) -> usize {
        lock_live(&self.live).len()
    }

    /// Cancel everything
    pub fn shutdown(&self) {
        let cancelled = self.cancel_where("shutdown", |_| true);
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "Scheduler shut down");
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for timer in lock_live(&self.live).values() {
            timer.token.cancel();
        }
    }
}

/// Remove `key` if `id` is still its live timer. Returns whether it was.
fn commit_fire(live: &Mutex<HashMap<TimerKey, LiveTimer>>, key: &TimerKey, id: u64) -> bool {
    let mut live = lock_live(live);
    match live.get(key) {
        Some(timer) if timer.id == id => {
            live.remove(key);
            true
        }
        _ => {
            trace!(key = %key, id, "Timer lost the race to a cancel or replace");
            false
        }
    }
}
