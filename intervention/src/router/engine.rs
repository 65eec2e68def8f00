//! Intervention Engine — signal routing and timer fire handling
//!
//! The engine owns the context store, the timer scheduler and the decision
//! adapter. `handle` is synchronous and never waits on the capability:
//! anything that needs a decision (timer fires, direct mentions, the
//! planning check) runs on its own task.
//!
//! Every decision follows the same three steps:
//!
//! 1. lock the room, check the epoch, apply gates, build a request, unlock
//! 2. await the adapter with no lock held
//! 3. re-lock, check the epoch again, record the delivery, unlock, send
//!
//! A reset between 1 and 3 changes the epoch and the result is dropped.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::mention::MentionDetector;
use super::signal::ActivitySignal;
use super::summary::RoomStateSummary;
use crate::context::{
    lock_room, AiMode, ChatMessage, ContextStore, ExecutionSnapshot, RoomContext, SharedContextStore,
    UserId,
};
use crate::decision::{
    CapabilityConfig, Decision, DecisionAdapter, DecisionOutcome, DecisionRequest, TriggerKind,
};
use crate::error::{InterventionError, InterventionResult};
use crate::escalation::EscalationTracker;
use crate::events::{AssistantEvent, EventBus, SharedEventBus};
use crate::messaging::{event_for, InterventionDelivery, MessagingPort};
use crate::scheduler::{FiredTimer, TimerClass, TimerKey, TimerScheduler};
use crate::settings::{GatingPolicy, InterventionSettings, SettingsUpdate};

/// Sender id used for assistant-authored messages
pub const ASSISTANT_USER_ID: &str = "ai_assistant";

/// Sent when a direct mention gets a decline
pub const DIRECT_MENTION_FALLBACK: &str =
    "I'm here to help! What specific question do you have about your code or programming problem?";

/// Opens reflection mode; also sent when a reflection response gets a decline
pub const REFLECTION_FALLBACK: &str = "What did you learn today?";

/// Sent once, shortly after a session starts
pub const SESSION_GREETING: &str = "Welcome! I'm here to support your pair programming session. \
I'll offer technical guidance and help maintain productive collaboration.";

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settings: InterventionSettings,
    pub policy: GatingPolicy,
    pub assistant_name: String,
    pub assistant_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings: InterventionSettings::default(),
            policy: GatingPolicy::default(),
            assistant_name: CapabilityConfig::default().assistant_name,
            assistant_id: ASSISTANT_USER_ID.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_settings(mut self, settings: InterventionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_policy(mut self, policy: GatingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }
}

/// Result of the locked half of a decision
enum Prepared {
    Skip(&'static str),
    Ask(DecisionRequest),
}

pub struct InterventionEngine {
    store: SharedContextStore,
    scheduler: TimerScheduler,
    adapter: DecisionAdapter,
    tracker: EscalationTracker,
    messaging: Arc<dyn MessagingPort>,
    events: SharedEventBus,
    settings: RwLock<InterventionSettings>,
    policy: GatingPolicy,
    mentions: MentionDetector,
    assistant_name: String,
    assistant_id: String,
}

impl InterventionEngine {
    /// Build the engine and start its timer dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        adapter: DecisionAdapter,
        messaging: Arc<dyn MessagingPort>,
    ) -> InterventionResult<Arc<Self>> {
        config.settings.validate()?;
        let mentions = MentionDetector::new(&config.assistant_name)?;
        let (scheduler, fired_rx) = TimerScheduler::new();

        let engine = Arc::new(Self {
            store: ContextStore::new().shared(),
            scheduler,
            adapter,
            tracker: EscalationTracker::default(),
            messaging,
            events: EventBus::new().shared(),
            settings: RwLock::new(config.settings),
            policy: config.policy,
            mentions,
            assistant_name: config.assistant_name,
            assistant_id: config.assistant_id,
        });
        Self::spawn_dispatcher(Arc::downgrade(&engine), fired_rx);

        info!(
            assistant = %engine.assistant_name,
            capability_configured = engine.adapter.is_configured(),
            "Intervention engine started"
        );
        Ok(engine)
    }

    /// Forward fire commands to per-fire tasks until the engine is dropped
    fn spawn_dispatcher(engine: Weak<Self>, mut fired_rx: mpsc::UnboundedReceiver<FiredTimer>) {
        tokio::spawn(async move {
            while let Some(fired) = fired_rx.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                tokio::spawn(async move { engine.process_fire(fired).await });
            }
            debug!("Timer dispatcher stopped");
        });
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store(&self) -> &SharedContextStore {
        &self.store
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> &GatingPolicy {
        &self.policy
    }

    pub fn adapter(&self) -> &DecisionAdapter {
        &self.adapter
    }

    pub fn settings(&self) -> InterventionSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.scheduler.is_armed(key)
    }

    /// Epoch the live timer for `key` was armed under
    pub fn armed_epoch(&self, key: &TimerKey) -> Option<u64> {
        self.scheduler.armed_epoch(key)
    }

    pub fn live_timer_count(&self) -> usize {
        self.scheduler.live_count()
    }

    /// Cancel every live timer
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!("Intervention engine shut down");
    }

    // ------------------------------------------------------------------
    // Signal routing
    // ------------------------------------------------------------------

    /// Route one inbound signal
    pub fn handle(self: &Arc<Self>, signal: ActivitySignal) -> InterventionResult<()> {
        if signal.room_id().trim().is_empty() {
            return Err(InterventionError::invalid_signal(format!(
                "{} without room_id",
                signal.kind()
            )));
        }
        debug!(room_id = %signal.room_id(), signal = signal.kind(), "Routing signal");

        match signal {
            ActivitySignal::ChatMessage { room_id, message } => {
                self.on_chat_message(&room_id, message)
            }
            ActivitySignal::CodeUpdate {
                room_id,
                code,
                language,
                user_id,
            } => self.on_code_update(&room_id, code, language, user_id),
            ActivitySignal::ProblemUpdate {
                room_id,
                title,
                description,
            } => self.store.set_problem(&room_id, title, description),
            ActivitySignal::VoiceActivityStart { room_id, user_id } => {
                self.on_activity_start(&room_id, user_id.as_deref(), "voice activity")
            }
            ActivitySignal::TypingStart { room_id, user_id } => {
                self.on_activity_start(&room_id, user_id.as_deref(), "typing")
            }
            ActivitySignal::ExecutionResult { room_id, snapshot } => {
                self.on_execution_result(&room_id, snapshot)
            }
            ActivitySignal::SessionStart { room_id } => self.on_session_start(&room_id),
            ActivitySignal::SessionReset { room_id } => self.reset_room(&room_id, "session reset"),
            ActivitySignal::ReflectionStarted { room_id } => self.set_reflection(&room_id, true),
            ActivitySignal::ReflectionEnded { room_id } => self.set_reflection(&room_id, false),
            ActivitySignal::SetAiMode { room_id, mode } => self.on_set_ai_mode(&room_id, mode),
            ActivitySignal::ParticipantJoined { room_id, user_id } => {
                self.store.get(&room_id);
                debug!(room_id = %room_id, user_id = %user_id, "Participant joined");
            }
            ActivitySignal::ParticipantLeft { room_id, user_id } => {
                self.on_participant_left(&room_id, &user_id)
            }
        }
        Ok(())
    }

    fn on_chat_message(self: &Arc<Self>, room_id: &str, message: ChatMessage) {
        let from_assistant = message.is_assistant;
        let is_mention = !from_assistant && self.mentions.is_mention(&message.content);
        let author = message.user_id.clone();

        self.store.append_message(room_id, message);
        if from_assistant {
            return;
        }

        let now = Utc::now();
        let (epoch, mode, reflection) = self.store.with_room(room_id, |ctx| {
            self.tracker.check_progress(ctx, now);
            (ctx.epoch, ctx.session.ai_mode, ctx.reflection_mode)
        });
        if mode == AiMode::None {
            debug!(room_id, "Assistant disabled for room, not arming");
            return;
        }

        let target = Self::target_user(mode, Some(&author));
        let idle_key = TimerKey::scoped(room_id, target.clone(), TimerClass::Idle);

        // Mentions are answered in reflection mode too
        if is_mention {
            self.cancel_timer(&idle_key, "new message");
            if reflection {
                self.cancel_timer(
                    &TimerKey::room(room_id, TimerClass::Reflection),
                    "direct mention",
                );
            }
            info!(room_id, user_id = %author, reflection, "Direct mention, bypassing timers");
            self.spawn_direct_mention(room_id, epoch, target);
            return;
        }

        if reflection {
            let keys = self
                .scheduler
                .cancel_room_class(room_id, TimerClass::Idle, "reflection mode");
            self.publish_cancelled(keys, "reflection mode");
            self.arm_timer(
                TimerKey::room(room_id, TimerClass::Reflection),
                self.policy.reflection_delay,
                epoch,
            );
            return;
        }

        self.cancel_timer(&idle_key, "new message");

        // Arm under the settings read lock so a concurrent disable cannot be
        // followed by an arm of the disabled class
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        if settings.idle_intervention_enabled {
            self.arm_timer(idle_key, settings.idle_delay(), epoch);
        }
        let progress_key = TimerKey::room(room_id, TimerClass::ProgressCheck);
        if settings.progress_check_enabled && !self.scheduler.is_armed(&progress_key) {
            self.arm_timer(progress_key, settings.progress_interval(), epoch);
        }
    }

    fn on_code_update(
        self: &Arc<Self>,
        room_id: &str,
        code: String,
        language: String,
        user_id: Option<UserId>,
    ) {
        self.store.set_code(room_id, code, language);
        let (epoch, mode, plan) = self.store.with_room(room_id, |ctx| {
            let plan = !ctx.planning_check_done
                && ctx.session.ai_mode != AiMode::None
                && ctx.human_message_count() > 0
                && !ctx.code.trim().is_empty();
            if plan {
                ctx.planning_check_done = true;
            }
            (ctx.epoch, ctx.session.ai_mode, plan)
        });

        self.cancel_timer(&TimerKey::room(room_id, TimerClass::Idle), "code update");
        if mode == AiMode::Individual {
            if let Some(user) = user_id {
                self.cancel_timer(&TimerKey::user(room_id, user, TimerClass::Idle), "code update");
            }
        }

        if plan {
            self.spawn_planning_check(room_id, epoch);
        }
    }

    fn on_activity_start(&self, room_id: &str, user_id: Option<&str>, reason: &str) {
        let mode = self
            .store
            .peek(room_id)
            .map(|room| lock_room(&room).session.ai_mode)
            .unwrap_or_default();
        let key = TimerKey::scoped(room_id, Self::target_user(mode, user_id), TimerClass::Idle);
        self.cancel_timer(&key, reason);
    }

    fn on_execution_result(&self, room_id: &str, snapshot: ExecutionSnapshot) {
        let now = Utc::now();
        self.store.set_execution_result(room_id, snapshot.clone());
        self.store.with_room(room_id, |ctx| {
            self.tracker.check_progress(ctx, now);
        });
        self.events.publish(AssistantEvent::ExecutionAnalysisRequested {
            room_id: room_id.to_string(),
            snapshot,
            timestamp: now,
        });
    }

    fn on_session_start(self: &Arc<Self>, room_id: &str) {
        let now = Utc::now();
        let (epoch, first_start) = self.store.with_room(room_id, |ctx| {
            let first_start = !ctx.session.started;
            ctx.session.started = true;
            self.tracker.reset(ctx, now);
            (ctx.epoch, first_start)
        });
        info!(room_id, first_start, "Session started");
        if first_start {
            self.spawn_greeting(room_id, epoch);
        }
    }

    fn set_reflection(&self, room_id: &str, enabled: bool) {
        let (epoch, changed) = self.store.with_room(room_id, |ctx| {
            let changed = ctx.reflection_mode != enabled;
            ctx.reflection_mode = enabled;
            (ctx.epoch, changed)
        });
        if enabled {
            let keys = self
                .scheduler
                .cancel_room_class(room_id, TimerClass::Idle, "reflection started");
            self.publish_cancelled(keys, "reflection started");
        } else {
            self.cancel_timer(
                &TimerKey::room(room_id, TimerClass::Reflection),
                "reflection ended",
            );
        }
        info!(room_id, reflection = enabled, "Reflection mode changed");

        if enabled && changed {
            let opening = self.deliver(
                room_id,
                epoch,
                REFLECTION_FALLBACK.to_string(),
                TriggerKind::Reflection,
                None,
            );
            if let Err(e) = opening {
                self.log_task_failure(room_id, TriggerKind::Reflection, &e);
            }
        }
    }

    fn on_set_ai_mode(&self, room_id: &str, mode: AiMode) {
        self.store.with_room(room_id, |ctx| ctx.session.ai_mode = mode);
        let keys = self.scheduler.cancel_room(room_id, "ai mode changed");
        self.publish_cancelled(keys, "ai mode changed");
        info!(room_id, %mode, "AI mode changed");
    }

    fn on_participant_left(&self, room_id: &str, user_id: &str) {
        let remaining = self.messaging.room_member_count(room_id);
        debug!(room_id, user_id, remaining, "Participant left");
        if remaining > 0 {
            return;
        }
        let keys = self.scheduler.cancel_room(room_id, "room empty");
        self.publish_cancelled(keys, "room empty");
        if self.store.remove(room_id) {
            info!(room_id, "Room empty, context destroyed");
            self.events.publish(AssistantEvent::RoomClosed {
                room_id: room_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Hard cancellation point: every timer goes, the context is cleared and
    /// in-flight results for the old epoch are dropped on arrival.
    ///
    /// The epoch moves before the sweep, so a timer armed concurrently under
    /// the old epoch is either swept here or withdrawn by `arm_timer`.
    fn reset_room(&self, room_id: &str, reason: &str) {
        let epoch = self.store.reset(room_id);
        let keys = self.scheduler.cancel_room(room_id, reason);
        self.publish_cancelled(keys, reason);
        info!(room_id, epoch, reason, "Room reset");
        self.events.publish(AssistantEvent::RoomReset {
            room_id: room_id.to_string(),
            epoch,
            timestamp: Utc::now(),
        });
    }

    // ------------------------------------------------------------------
    // Settings and inspection
    // ------------------------------------------------------------------

    /// Apply a partial settings update.
    ///
    /// Timers of a class that the update disables are cancelled before this
    /// returns. An invalid update changes nothing.
    pub fn update_settings(&self, update: &SettingsUpdate) -> InterventionResult<InterventionSettings> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let change = settings.apply(update).map_err(|e| {
            warn!(error = %e, "Settings update rejected");
            e
        })?;

        if change.idle_disabled {
            let keys = self
                .scheduler
                .cancel_class(TimerClass::Idle, "idle interventions disabled");
            self.publish_cancelled(keys, "idle interventions disabled");
        }
        if change.progress_check_disabled {
            let keys = self
                .scheduler
                .cancel_class(TimerClass::ProgressCheck, "progress check disabled");
            self.publish_cancelled(keys, "progress check disabled");
        }
        let snapshot = settings.clone();
        drop(settings);

        info!(
            idle_enabled = snapshot.idle_intervention_enabled,
            idle_delay = snapshot.idle_intervention_delay,
            progress_enabled = snapshot.progress_check_enabled,
            progress_interval = snapshot.progress_check_interval,
            "Intervention settings updated"
        );
        self.events.publish(AssistantEvent::SettingsUpdated {
            settings: snapshot.clone(),
            timestamp: Utc::now(),
        });
        Ok(snapshot)
    }

    /// Debug view of one room
    pub fn room_state_summary(&self, room_id: &str) -> RoomStateSummary {
        let Some(ctx) = self.store.snapshot(room_id) else {
            return RoomStateSummary::empty(room_id);
        };
        let keys = self.scheduler.armed_keys(room_id);
        let armed = |class: TimerClass| keys.iter().any(|k| k.class == class);

        RoomStateSummary {
            room_id: room_id.to_string(),
            has_context: true,
            epoch: Some(ctx.epoch),
            message_count: ctx.messages.len(),
            planning_check_done: ctx.planning_check_done,
            has_code_context: !ctx.code.trim().is_empty(),
            has_problem_context: ctx.has_problem(),
            last_assistant_response: ctx.last_assistant_response,
            session_started: ctx.session.started,
            ai_mode: ctx.session.ai_mode,
            reflection_mode: ctx.reflection_mode,
            idle_armed: armed(TimerClass::Idle),
            progress_check_armed: armed(TimerClass::ProgressCheck),
            reflection_armed: armed(TimerClass::Reflection),
            escalation_depth: ctx.escalation.depth(),
        }
    }

    // ------------------------------------------------------------------
    // Timer bookkeeping
    // ------------------------------------------------------------------

    fn target_user(mode: AiMode, user_id: Option<&str>) -> Option<UserId> {
        match (mode, user_id) {
            (AiMode::Individual, Some(user)) if !user.is_empty() => Some(user.to_string()),
            _ => None,
        }
    }

    fn arm_timer(&self, key: TimerKey, delay: std::time::Duration, epoch: u64) {
        let handle = self.scheduler.arm(key, delay, epoch);
        if !self.store.is_current(&handle.key.room_id, epoch) {
            self.scheduler.cancel_handle(&handle, "room reset");
            return;
        }
        self.events.publish(AssistantEvent::TimerArmed {
            room_id: handle.key.room_id.clone(),
            user_id: handle.key.user_id.clone(),
            class: handle.key.class,
            delay_ms: delay.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }

    fn cancel_timer(&self, key: &TimerKey, reason: &str) -> bool {
        let cancelled = self.scheduler.cancel(key, reason);
        if cancelled {
            self.publish_cancelled(vec![key.clone()], reason);
        }
        cancelled
    }

    fn publish_cancelled(&self, keys: Vec<TimerKey>, reason: &str) {
        let timestamp = Utc::now();
        for key in keys {
            self.events.publish(AssistantEvent::TimerCancelled {
                room_id: key.room_id,
                user_id: key.user_id,
                class: key.class,
                reason: reason.to_string(),
                timestamp,
            });
        }
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    async fn process_fire(&self, fired: FiredTimer) {
        let room_id = fired.key.room_id.clone();
        let class = fired.key.class;
        debug!(room_id = %room_id, %class, epoch = fired.epoch, "Timer fired");

        let result = match class {
            TimerClass::Idle => self.fire_idle(&fired).await,
            TimerClass::ProgressCheck => self.fire_progress_check(&fired).await,
            TimerClass::Reflection => self.fire_reflection(&fired).await,
        };
        if let Err(e) = result {
            if e.is_benign() {
                debug!(room_id = %room_id, %class, reason = %e, "Timer result discarded");
            } else {
                let failure = InterventionError::callback_failure(&room_id, class, e.to_string());
                warn!(code = failure.code(), "{}", failure);
            }
        }
    }

    fn spawn_direct_mention(self: &Arc<Self>, room_id: &str, epoch: u64, target: Option<UserId>) {
        let engine = Arc::clone(self);
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.respond_to_mention(&room_id, epoch, target).await {
                engine.log_task_failure(&room_id, TriggerKind::DirectMention, &e);
            }
        });
    }

    fn spawn_greeting(self: &Arc<Self>, room_id: &str, epoch: u64) {
        if !self.adapter.is_configured() {
            debug!(room_id, "No decision capability, skipping greeting");
            return;
        }
        let engine = Arc::clone(self);
        let room_id = room_id.to_string();
        let delay = self.policy.greeting_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let greeting = engine.deliver(
                &room_id,
                epoch,
                SESSION_GREETING.to_string(),
                TriggerKind::Greeting,
                None,
            );
            if let Err(e) = greeting {
                engine.log_task_failure(&room_id, TriggerKind::Greeting, &e);
            }
        });
    }

    fn spawn_planning_check(self: &Arc<Self>, room_id: &str, epoch: u64) {
        let engine = Arc::clone(self);
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.run_planning_check(&room_id, epoch).await {
                engine.log_task_failure(&room_id, TriggerKind::Planning, &e);
            }
        });
    }

    fn log_task_failure(&self, room_id: &str, trigger: TriggerKind, err: &InterventionError) {
        if err.is_benign() {
            debug!(room_id, %trigger, reason = %err, "Result discarded");
        } else {
            warn!(room_id, %trigger, code = err.code(), error = %err, "Assistant task failed");
        }
    }

    /// Locked half of a decision: epoch check, gates, request
    fn prepare(
        &self,
        room_id: &str,
        epoch: u64,
        trigger: TriggerKind,
        target_user: Option<UserId>,
        gate: impl FnOnce(&mut RoomContext, DateTime<Utc>) -> Option<&'static str>,
    ) -> InterventionResult<Prepared> {
        let room = self
            .store
            .peek(room_id)
            .ok_or_else(|| InterventionError::stale_room(room_id))?;
        let mut ctx = lock_room(&room);
        if ctx.epoch != epoch {
            return Err(InterventionError::stale_room(room_id));
        }

        let now = Utc::now();
        if let Some(reason) = gate(&mut *ctx, now) {
            return Ok(Prepared::Skip(reason));
        }
        let request =
            DecisionRequest::from_context(&ctx, trigger, &self.policy, now, &self.assistant_name)
                .with_target_user(target_user);
        Ok(Prepared::Ask(request))
    }

    async fn fire_idle(&self, fired: &FiredTimer) -> InterventionResult<()> {
        let policy = &self.policy;
        let prepared = self.prepare(
            &fired.key.room_id,
            fired.epoch,
            TriggerKind::Idle,
            fired.key.user_id.clone(),
            |ctx, now| {
                if ctx.session.ai_mode == AiMode::None {
                    return Some("assistant disabled");
                }
                if ctx.reflection_mode {
                    return Some("reflection mode");
                }
                self.tracker.check_progress(ctx, now);
                if let Some(since) = ctx.since_last_response(now) {
                    let cooling = since
                        .to_std()
                        .map(|s| s < policy.response_cooldown)
                        .unwrap_or(true);
                    if cooling {
                        return Some("response cooldown");
                    }
                }
                if ctx.human_message_count() < policy.min_messages_before_response {
                    return Some("not enough messages");
                }
                None
            },
        )?;
        self.decide_and_apply(prepared, fired.epoch, None).await
    }

    async fn fire_progress_check(&self, fired: &FiredTimer) -> InterventionResult<()> {
        let min_messages = self.policy.progress_check_min_messages;
        let prepared = self.prepare(
            &fired.key.room_id,
            fired.epoch,
            TriggerKind::ProgressCheck,
            None,
            |ctx, now| {
                if ctx.session.ai_mode == AiMode::None {
                    return Some("assistant disabled");
                }
                if ctx.messages.len() < min_messages {
                    return Some("not enough activity");
                }
                self.tracker.check_progress(ctx, now);
                None
            },
        )?;
        self.decide_and_apply(prepared, fired.epoch, None).await
    }

    async fn fire_reflection(&self, fired: &FiredTimer) -> InterventionResult<()> {
        let prepared = self.prepare(
            &fired.key.room_id,
            fired.epoch,
            TriggerKind::Reflection,
            None,
            |ctx, _| (!ctx.reflection_mode).then_some("reflection ended"),
        )?;
        self.decide_and_apply(prepared, fired.epoch, Some(REFLECTION_FALLBACK))
            .await
    }

    async fn respond_to_mention(
        &self,
        room_id: &str,
        epoch: u64,
        target: Option<UserId>,
    ) -> InterventionResult<()> {
        if !self.adapter.is_configured() {
            debug!(room_id, "No decision capability, ignoring mention");
            return Err(InterventionError::ConfigurationUnavailable);
        }
        let prepared = self.prepare(room_id, epoch, TriggerKind::DirectMention, target, |ctx, now| {
            if ctx.session.ai_mode == AiMode::None {
                return Some("assistant disabled");
            }
            self.tracker.check_progress(ctx, now);
            None
        })?;
        self.decide_and_apply(prepared, epoch, Some(DIRECT_MENTION_FALLBACK))
            .await
    }

    async fn run_planning_check(&self, room_id: &str, epoch: u64) -> InterventionResult<()> {
        let prepared = self.prepare(room_id, epoch, TriggerKind::Planning, None, |_, _| None)?;
        self.decide_and_apply(prepared, epoch, None).await
    }

    /// Unlocked and re-locked halves of a decision
    async fn decide_and_apply(
        &self,
        prepared: Prepared,
        epoch: u64,
        fallback: Option<&str>,
    ) -> InterventionResult<()> {
        let request = match prepared {
            Prepared::Skip(reason) => {
                debug!(reason, "Decision skipped by gate");
                return Ok(());
            }
            Prepared::Ask(request) => request,
        };

        let outcome = self.adapter.decide(&request).await;
        self.apply_outcome(&request, epoch, outcome, fallback)
    }

    fn apply_outcome(
        &self,
        request: &DecisionRequest,
        epoch: u64,
        outcome: DecisionOutcome,
        fallback: Option<&str>,
    ) -> InterventionResult<()> {
        let text = match (outcome.decision, fallback) {
            (Decision::Intervene { text }, _) => text,
            (Decision::Decline, Some(fallback)) => fallback.to_string(),
            (Decision::Decline, None) => {
                if !self.store.is_current(&request.room_id, epoch) {
                    return Err(InterventionError::stale_room(&request.room_id));
                }
                self.events.publish(AssistantEvent::Declined {
                    room_id: request.room_id.clone(),
                    trigger_kind: request.trigger,
                    justification: outcome.justification,
                    timestamp: Utc::now(),
                });
                return Ok(());
            }
        };
        self.deliver(
            &request.room_id,
            epoch,
            text,
            request.trigger,
            request.target_user.clone(),
        )
    }

    /// Record an intervention in the room and send it out
    fn deliver(
        &self,
        room_id: &str,
        epoch: u64,
        text: String,
        trigger: TriggerKind,
        target_user: Option<UserId>,
    ) -> InterventionResult<()> {
        let now = Utc::now();
        let (delivery, depth) = {
            let room = self
                .store
                .peek(room_id)
                .ok_or_else(|| InterventionError::stale_room(room_id))?;
            let mut ctx = lock_room(&room);
            if ctx.epoch != epoch {
                return Err(InterventionError::stale_room(room_id));
            }
            if ctx.session.ai_mode == AiMode::None {
                debug!(room_id, %trigger, "Assistant disabled for room, not delivering");
                return Ok(());
            }

            let message = ChatMessage::assistant(&self.assistant_id, &self.assistant_name, text.clone());
            let delivery = InterventionDelivery {
                id: message.id.clone(),
                room_id: room_id.to_string(),
                text: text.clone(),
                trigger_kind: trigger,
                username: self.assistant_name.clone(),
                user_id: self.assistant_id.clone(),
                target_user: target_user.clone(),
                timestamp: message.timestamp,
                is_auto_generated: true,
            };
            ctx.messages.push(message);
            ctx.last_assistant_response = Some(now);
            let depth = self.tracker.record_delivery(&mut ctx, &text, trigger, now);
            (delivery, depth)
        };

        let payload = serde_json::to_value(&delivery)?;
        let event = event_for(trigger);
        let sent = match &target_user {
            Some(user) => self.messaging.deliver_to_user(user, event, payload),
            None => self.messaging.broadcast(room_id, event, payload, None),
        };
        if let Err(e) = sent {
            error!(room_id, %trigger, error = %e, "Failed to deliver intervention");
            return Err(e);
        }

        info!(
            room_id,
            %trigger,
            user_id = ?target_user,
            escalation_depth = depth,
            "Intervention delivered"
        );
        self.events.publish(AssistantEvent::Intervened {
            room_id: room_id.to_string(),
            user_id: target_user,
            text,
            trigger_kind: trigger,
            escalation_depth: depth,
            timestamp: now,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::RecordingPort;

    fn engine() -> Arc<InterventionEngine> {
        InterventionEngine::start(
            EngineConfig::default(),
            DecisionAdapter::unavailable(),
            Arc::new(RecordingPort::new()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_without_room_is_rejected() {
        let engine = engine();
        let err = engine
            .handle(ActivitySignal::SessionStart {
                room_id: " ".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNAL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_of_unknown_room() {
        let engine = engine();
        let summary = engine.room_state_summary("nowhere");
        assert!(!summary.has_context);
        assert!(!summary.idle_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_rejected_at_start() {
        let config = EngineConfig::default().with_settings(InterventionSettings {
            idle_intervention_delay: 0,
            ..Default::default()
        });
        let result = InterventionEngine::start(
            config,
            DecisionAdapter::unavailable(),
            Arc::new(RecordingPort::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_message_arms_idle_and_progress() {
        let engine = engine();
        engine
            .handle(ActivitySignal::ChatMessage {
                room_id: "r1".into(),
                message: ChatMessage::new("u1", "Alice", "let's start"),
            })
            .unwrap();

        let summary = engine.room_state_summary("r1");
        assert!(summary.idle_armed);
        assert!(summary.progress_check_armed);
        assert_eq!(summary.message_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_none_arms_nothing() {
        let engine = engine();
        engine
            .handle(ActivitySignal::SetAiMode {
                room_id: "r1".into(),
                mode: AiMode::None,
            })
            .unwrap();
        engine
            .handle(ActivitySignal::ChatMessage {
                room_id: "r1".into(),
                message: ChatMessage::new("u1", "Alice", "hello"),
            })
            .unwrap();
        assert_eq!(engine.live_timer_count(), 0);
    }
}
