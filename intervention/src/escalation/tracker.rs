//! Escalation Tracker — records utterances and resets on human progress

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::progress::{ProgressDetector, ProgressSignal};
use super::record::Utterance;
use crate::context::RoomContext;
use crate::decision::TriggerKind;

/// Maintains each room's escalation record.
///
/// Stateless apart from its detector; the record itself lives in the room
/// context and is mutated under the room lock by the caller.
#[derive(Debug, Clone, Default)]
pub struct EscalationTracker {
    detector: ProgressDetector,
}

impl EscalationTracker {
    pub fn new(detector: ProgressDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &ProgressDetector {
        &self.detector
    }

    /// Record a delivered intervention.
    ///
    /// Reflection responses are not part of the ladder. Returns the depth
    /// after recording.
    pub fn record_delivery(
        &self,
        ctx: &mut RoomContext,
        text: &str,
        trigger: TriggerKind,
        at: DateTime<Utc>,
    ) -> usize {
        if trigger.escalates() {
            ctx.escalation.push(Utterance {
                text: text.to_string(),
                trigger,
                delivered_at: at,
            });
            debug!(
                room_id = %ctx.room_id,
                depth = ctx.escalation.depth(),
                %trigger,
                "Escalation recorded"
            );
        }
        ctx.escalation.depth()
    }

    /// Detect progress and clear the record when found
    pub fn check_progress(
        &self,
        ctx: &mut RoomContext,
        now: DateTime<Utc>,
    ) -> Option<ProgressSignal> {
        let signal = self.detector.detect(ctx, now)?;
        let previous_depth = ctx.escalation.depth();
        ctx.escalation.clear(now);
        if previous_depth > 0 {
            info!(
                room_id = %ctx.room_id,
                previous_depth,
                reason = %signal.description,
                "Progress detected, escalation reset"
            );
        }
        Some(signal)
    }

    /// Clear the record unconditionally (session start)
    pub fn reset(&self, ctx: &mut RoomContext, now: DateTime<Utc>) {
        ctx.escalation.clear(now);
    }
}
