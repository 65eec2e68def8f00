//! Timer scheduling for delayed interventions
//!
//! ```text
//! arm(key) ──▶ live map ──▶ task: select { token.cancelled(), sleep_until(deadline) }
//!                 ▲                                    │
//! cancel(key) ────┘ remove + cancel token              │ deadline
//!                                                      ▼
//!                          commit: still the live id? remove key
//!                                                      │
//!                                                      ▼
//!                                  FiredTimer ──▶ engine dispatcher
//! ```

pub mod timer;
pub mod types;

pub use timer::TimerScheduler;
pub use types::{FiredTimer, TimerClass, TimerHandle, TimerKey};
