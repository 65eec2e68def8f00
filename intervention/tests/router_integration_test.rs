//! End-to-end routing tests: signals in, deliveries and events out.
//!
//! Tests verify:
//! - Direct mentions answer immediately, ignore the cooldown and fall back on decline
//! - Individual mode scopes idle timers to one participant
//! - A session reset drops results that were in flight when it happened
//! - Reflection mode swaps the idle timer for the reflection-response timer
//!   and opens with a fixed question; mentions are still answered at once
//! - A session start is followed by one greeting
//! - A failed delivery does not stop the room from firing again
//! - The planning check runs once per session
//! - Rooms are destroyed when their last participant leaves

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{advance, settle, Harness, ScriptedCapability};
use pair_intervention::messaging::{Recipient, CHAT_MESSAGE_EVENT, REFLECTION_MESSAGE_EVENT};
use pair_intervention::router::{DIRECT_MENTION_FALLBACK, REFLECTION_FALLBACK, SESSION_GREETING};
use pair_intervention::{
    ActivitySignal, AiMode, AssistantEvent, ChatMessage, DecisionAdapter, DecisionOutcome,
    EngineConfig, ExecutionSnapshot, GatingPolicy, InterventionEngine, RecordingPort, TimerClass,
    TimerKey, TriggerKind,
};

fn no_cooldown() -> EngineConfig {
    EngineConfig::default().with_policy(GatingPolicy {
        response_cooldown: Duration::ZERO,
        ..Default::default()
    })
}

fn code_update(room: &str, user: Option<&str>, code: &str) -> ActivitySignal {
    ActivitySignal::CodeUpdate {
        room_id: room.into(),
        code: code.into(),
        language: "python".into(),
        user_id: user.map(String::from),
    }
}

// ── Property: direct mentions ───

#[tokio::test(start_paused = true)]
async fn test_direct_mention_bypasses_cooldown() {
    let h = Harness::start(ScriptedCapability::intervening("Look at line 3."));

    h.say("r1", "u1", "let's write the parser");
    advance(5.5).await;
    assert_eq!(h.port.deliveries().len(), 1);

    // Well inside the 15s cooldown
    h.say("r1", "u1", "Bob, what does this error mean?");
    settle().await;
    let calls = h.capability.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].trigger, TriggerKind::DirectMention);
    assert_eq!(h.port.deliveries().len(), 2);

    // An ordinary idle firing is still held back by the cooldown
    h.say("r1", "u1", "ok, trying that");
    advance(6.0).await;
    assert_eq!(h.capability.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_declined_mention_gets_fallback() {
    let h = Harness::start(ScriptedCapability::declining());

    h.say("r1", "u1", "@ai are you there?");
    settle().await;

    let sent = h.port.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, CHAT_MESSAGE_EVENT);
    let delivery = sent[0].delivery().unwrap();
    assert_eq!(delivery.text, DIRECT_MENTION_FALLBACK);
    assert_eq!(delivery.trigger_kind, TriggerKind::DirectMention);
    assert_eq!(delivery.username, "Bob");
    assert!(delivery.is_auto_generated);
}

#[tokio::test(start_paused = true)]
async fn test_mention_arms_no_idle_timer() {
    let h = Harness::start(ScriptedCapability::intervening("Sure."));

    h.say("r1", "u1", "hey bob, quick question");
    assert!(!h.engine.is_armed(&TimerKey::room("r1", TimerClass::Idle)));

    settle().await;
    advance(10.0).await;
    assert_eq!(h.capability.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mention_without_capability_is_silent() {
    let port = Arc::new(RecordingPort::new());
    let engine = InterventionEngine::start(
        EngineConfig::default(),
        DecisionAdapter::unavailable(),
        port.clone(),
    )
    .unwrap();

    engine
        .handle(ActivitySignal::ChatMessage {
            room_id: "r1".into(),
            message: ChatMessage::new("u1", "Alice", "@ai help"),
        })
        .unwrap();
    settle().await;
    advance(60.0).await;

    assert!(port.sent().is_empty());
}

// ── Property: individual mode scopes timers per participant ───

#[tokio::test(start_paused = true)]
async fn test_individual_code_update_cancels_only_that_user() {
    let h = Harness::start_with(ScriptedCapability::intervening("Check your base case."), no_cooldown());
    h.signal(ActivitySignal::SetAiMode {
        room_id: "r1".into(),
        mode: AiMode::Individual,
    });

    h.say("r1", "u1", "I'll do the recursion");
    h.say("r1", "u2", "I'll write tests");
    let u1 = TimerKey::user("r1", "u1", TimerClass::Idle);
    let u2 = TimerKey::user("r1", "u2", TimerClass::Idle);
    assert!(h.engine.is_armed(&u1));
    assert!(h.engine.is_armed(&u2));

    h.signal(code_update("r1", Some("u1"), "def fact(n):\n    return n"));
    assert!(!h.engine.is_armed(&u1));
    assert!(h.engine.is_armed(&u2));

    advance(5.5).await;
    let idle = h.capability.calls_for(TriggerKind::Idle);
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].target_user.as_deref(), Some("u2"));

    let to_u2: Vec<_> = h
        .port
        .sent()
        .into_iter()
        .filter(|m| {
            m.recipient
                == Recipient::User {
                    user_id: "u2".into(),
                }
        })
        .collect();
    assert_eq!(to_u2.len(), 1);
    assert_eq!(to_u2[0].delivery().unwrap().target_user.as_deref(), Some("u2"));
}

#[tokio::test(start_paused = true)]
async fn test_shared_mode_code_update_cancels_room_timer() {
    let h = Harness::start(ScriptedCapability::declining());

    h.say("r1", "u1", "starting");
    h.signal(code_update("r1", Some("u1"), ""));

    assert!(!h.engine.is_armed(&TimerKey::room("r1", TimerClass::Idle)));
    assert!(h.engine.is_armed(&TimerKey::room("r1", TimerClass::ProgressCheck)));
}

#[tokio::test(start_paused = true)]
async fn test_mode_none_cancels_and_stops_arming() {
    let h = Harness::start(ScriptedCapability::intervening("hint"));

    h.say("r1", "u1", "hello");
    assert_eq!(h.engine.live_timer_count(), 2);

    h.signal(ActivitySignal::SetAiMode {
        room_id: "r1".into(),
        mode: AiMode::None,
    });
    assert_eq!(h.engine.live_timer_count(), 0);

    h.say("r1", "u1", "anyone?");
    advance(120.0).await;
    assert!(h.capability.calls().is_empty());
}

// ── Property: reset discards in-flight work ───

#[tokio::test(start_paused = true)]
async fn test_reset_discards_in_flight_decision() {
    let h = Harness::start(
        ScriptedCapability::intervening("Too late.").with_latency(Duration::from_secs(10)),
    );
    let mut events = h.engine.subscribe();

    h.say("r1", "u1", "stuck on this");
    advance(6.0).await;
    assert_eq!(h.capability.calls().len(), 1, "decision should be in flight");

    h.signal(ActivitySignal::SessionReset {
        room_id: "r1".into(),
    });
    let summary = h.engine.room_state_summary("r1");
    assert_eq!(summary.message_count, 0);
    assert_eq!(h.engine.live_timer_count(), 0);

    advance(20.0).await;
    assert!(h.port.sent().is_empty());

    let mut saw_reset = false;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, AssistantEvent::Intervened { .. }));
        saw_reset |= matches!(event, AssistantEvent::RoomReset { .. });
    }
    assert!(saw_reset);
}

#[tokio::test(start_paused = true)]
async fn test_reset_room_accepts_new_activity() {
    let h = Harness::start(ScriptedCapability::intervening("Fresh start."));

    h.say("r1", "u1", "old session");
    h.signal(ActivitySignal::SessionReset {
        room_id: "r1".into(),
    });
    h.say("r1", "u1", "new session");

    advance(5.5).await;
    let deliveries = h.port.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].text, "Fresh start.");
}

// ── Property: reflection mode ───

#[tokio::test(start_paused = true)]
async fn test_reflection_message_gets_fallback_prompt() {
    let h = Harness::start(ScriptedCapability::declining());

    h.say("r1", "u1", "hello");
    h.signal(ActivitySignal::ReflectionStarted {
        room_id: "r1".into(),
    });
    assert!(!h.engine.room_state_summary("r1").idle_armed);

    h.say("r1", "u1", "we finally got the tests green");
    let summary = h.engine.room_state_summary("r1");
    assert!(summary.reflection_armed);
    assert!(!summary.idle_armed);

    advance(5.5).await;
    let sent = h.port.sent();
    // Opening question, then the fallback for the declined response
    assert_eq!(sent.len(), 2);
    for message in &sent {
        assert_eq!(message.event, REFLECTION_MESSAGE_EVENT);
        assert_eq!(message.delivery().unwrap().text, REFLECTION_FALLBACK);
    }
    assert_eq!(h.capability.calls_for(TriggerKind::Reflection).len(), 1);
    assert_eq!(h.engine.room_state_summary("r1").escalation_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reflection_end_cancels_pending_response() {
    let h = Harness::start(ScriptedCapability::intervening("Nice work."));

    h.signal(ActivitySignal::ReflectionStarted {
        room_id: "r1".into(),
    });
    h.say("r1", "u1", "that was fun");
    h.signal(ActivitySignal::ReflectionEnded {
        room_id: "r1".into(),
    });
    assert!(!h.engine.room_state_summary("r1").reflection_armed);

    advance(10.0).await;
    assert!(h.capability.calls_for(TriggerKind::Reflection).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reflection_start_sends_opening_question() {
    let h = Harness::start(ScriptedCapability::intervening("unused"));

    h.signal(ActivitySignal::ReflectionStarted {
        room_id: "r1".into(),
    });
    let sent = h.port.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, REFLECTION_MESSAGE_EVENT);
    let delivery = sent[0].delivery().unwrap();
    assert_eq!(delivery.text, REFLECTION_FALLBACK);
    assert_eq!(delivery.trigger_kind, TriggerKind::Reflection);
    assert!(h.capability.calls().is_empty());

    // Already in reflection mode: no second opening
    h.signal(ActivitySignal::ReflectionStarted {
        room_id: "r1".into(),
    });
    assert_eq!(h.port.sent().len(), 1);

    let summary = h.engine.room_state_summary("r1");
    assert_eq!(summary.message_count, 1);
    assert_eq!(summary.escalation_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn test_mention_in_reflection_mode_is_answered_now() {
    let h = Harness::start(ScriptedCapability::intervening(
        "A closure is a function that keeps the variables around it.",
    ));

    h.signal(ActivitySignal::ReflectionStarted {
        room_id: "r1".into(),
    });
    h.say("r1", "u1", "we learned about scopes");
    assert!(h.engine.room_state_summary("r1").reflection_armed);

    h.say("r1", "u1", "@ai what is a closure?");
    settle().await;
    let calls = h.capability.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].trigger, TriggerKind::DirectMention);
    assert!(!h.engine.room_state_summary("r1").reflection_armed);

    let deliveries = h.port.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[1].trigger_kind, TriggerKind::DirectMention);

    // The pending reflection response was replaced by the answer
    advance(10.0).await;
    assert!(h.capability.calls_for(TriggerKind::Reflection).is_empty());
}

// ── Property: session greeting ───

#[tokio::test(start_paused = true)]
async fn test_session_start_greets_once() {
    let h = Harness::start(ScriptedCapability::intervening("unused"));

    h.signal(ActivitySignal::SessionStart {
        room_id: "r1".into(),
    });
    assert!(h.port.sent().is_empty());

    advance(1.5).await;
    let sent = h.port.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, CHAT_MESSAGE_EVENT);
    let delivery = sent[0].delivery().unwrap();
    assert_eq!(delivery.text, SESSION_GREETING);
    assert_eq!(delivery.trigger_kind, TriggerKind::Greeting);
    assert!(h.capability.calls().is_empty());
    assert_eq!(h.engine.room_state_summary("r1").message_count, 1);

    h.signal(ActivitySignal::SessionStart {
        room_id: "r1".into(),
    });
    advance(5.0).await;
    assert_eq!(h.port.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_greeting_skipped_without_capability() {
    let port = Arc::new(RecordingPort::new());
    let engine = InterventionEngine::start(
        EngineConfig::default(),
        DecisionAdapter::unavailable(),
        port.clone(),
    )
    .unwrap();

    engine
        .handle(ActivitySignal::SessionStart {
            room_id: "r1".into(),
        })
        .unwrap();
    advance(5.0).await;

    assert!(port.sent().is_empty());
    assert!(engine.room_state_summary("r1").session_started);
}

#[tokio::test(start_paused = true)]
async fn test_reset_before_greeting_drops_it() {
    let h = Harness::start(ScriptedCapability::intervening("unused"));

    h.signal(ActivitySignal::SessionStart {
        room_id: "r1".into(),
    });
    advance(0.5).await;
    h.signal(ActivitySignal::SessionReset {
        room_id: "r1".into(),
    });
    advance(2.0).await;

    assert!(h.port.sent().is_empty());
    assert_eq!(h.engine.room_state_summary("r1").message_count, 0);
}

// ── Property: delivery failures ───

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_leaves_room_able_to_fire_again() {
    let h = Harness::start_with(ScriptedCapability::intervening("Try a smaller input."), no_cooldown());
    let mut events = h.engine.subscribe();
    let idle = TimerKey::room("r1", TimerClass::Idle);

    h.port.set_failing(true);
    h.say("r1", "u1", "this keeps crashing");
    advance(5.5).await;
    assert_eq!(h.capability.calls_for(TriggerKind::Idle).len(), 1);
    assert!(h.port.sent().is_empty());
    assert!(!h.engine.is_armed(&idle));
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, AssistantEvent::Intervened { .. }));
    }

    h.port.set_failing(false);
    h.say("r1", "u1", "still crashing on the big file");
    assert!(h.engine.is_armed(&idle));
    advance(5.5).await;

    assert_eq!(h.capability.calls_for(TriggerKind::Idle).len(), 2);
    let deliveries = h.port.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].text, "Try a smaller input.");
}

// ── Property: planning check ───

#[tokio::test(start_paused = true)]
async fn test_planning_check_runs_once() {
    let h = Harness::start(
        ScriptedCapability::declining().with_script(vec![DecisionOutcome::intervene(
            "Maybe sketch the steps first?",
        )]),
    );

    h.signal(code_update("r1", None, "print('hi')"));
    settle().await;
    assert!(h.capability.calls().is_empty(), "no discussion yet");

    h.say("r1", "u1", "let's just start coding");
    h.signal(code_update("r1", None, "for x in data:"));
    settle().await;
    assert_eq!(h.capability.calls_for(TriggerKind::Planning).len(), 1);
    assert!(h.engine.room_state_summary("r1").planning_check_done);
    assert_eq!(h.port.deliveries()[0].trigger_kind, TriggerKind::Planning);

    h.signal(code_update("r1", None, "for x in data:\n    print(x)"));
    settle().await;
    assert_eq!(h.capability.calls_for(TriggerKind::Planning).len(), 1);
}

// ── Property: execution results and room lifecycle ───

#[tokio::test(start_paused = true)]
async fn test_execution_result_requests_analysis() {
    let h = Harness::start(ScriptedCapability::declining());
    let mut events = h.engine.subscribe();

    h.signal(ActivitySignal::ExecutionResult {
        room_id: "r1".into(),
        snapshot: ExecutionSnapshot {
            code: "print(1/0)".into(),
            output: String::new(),
            error: Some("ZeroDivisionError".into()),
            success: false,
            duration_ms: 12,
            timestamp: chrono::Utc::now(),
        },
    });

    let event = events.try_recv().unwrap();
    match event {
        AssistantEvent::ExecutionAnalysisRequested { room_id, snapshot, .. } => {
            assert_eq!(room_id, "r1");
            assert_eq!(snapshot.error.as_deref(), Some("ZeroDivisionError"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_room_destroyed_when_last_participant_leaves() {
    let h = Harness::start(ScriptedCapability::intervening("hint"));
    let mut events = h.engine.subscribe();

    h.port.set_member_count("r1", 1);
    h.say("r1", "u1", "hello");
    h.signal(ActivitySignal::ParticipantLeft {
        room_id: "r1".into(),
        user_id: "u2".into(),
    });
    assert!(h.engine.room_state_summary("r1").has_context);
    assert_eq!(h.engine.live_timer_count(), 2);

    h.port.set_member_count("r1", 0);
    h.signal(ActivitySignal::ParticipantLeft {
        room_id: "r1".into(),
        user_id: "u1".into(),
    });
    assert!(!h.engine.room_state_summary("r1").has_context);
    assert_eq!(h.engine.live_timer_count(), 0);

    let mut closed = false;
    while let Ok(event) = events.try_recv() {
        closed |= matches!(event, AssistantEvent::RoomClosed { .. });
    }
    assert!(closed);

    advance(60.0).await;
    assert!(h.capability.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_assistant_messages_do_not_arm_timers() {
    let h = Harness::start(ScriptedCapability::declining());

    h.signal(ActivitySignal::ChatMessage {
        room_id: "r1".into(),
        message: ChatMessage::assistant("ai_assistant", "Bob", "Hi all!"),
    });

    assert_eq!(h.engine.live_timer_count(), 0);
    assert_eq!(h.engine.room_state_summary("r1").message_count, 1);
}
