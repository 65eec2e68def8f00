//! Prompt text for the HTTP decision capability.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so logged decisions can be traced back to the prompt that produced them.
//! `{name}` is replaced with the configured assistant name.

use super::request::DecisionRequest;
use super::types::TriggerKind;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Shared system preamble
pub const SYSTEM_PREAMBLE: &str = "\
You are {name}, an assistant sitting in on a live pair-programming session. \
Your goal is learning, not answers: help the group think, do not solve the \
problem for them. Only speak when it is genuinely useful.

Reply with a single JSON object and nothing else:
{\"intervene\": true|false, \"message\": \"<what to say, empty when not intervening>\", \
\"justification\": \"<one short sentence explaining the decision>\"}";

/// Idle-response preamble
pub const IDLE_PREAMBLE: &str = "\
The conversation has gone quiet. Decide whether to step in.
- Stuck or confused: offer a helpful hint or a specific tip.
- Actively discussing: stay quiet and let them work it out.
- Clear bug in a recent run: point it out gently.
Keep the message to 10-30 words and vary the kind of help; not every reply \
should be a question.";

/// Direct-mention preamble
pub const DIRECT_MENTION_PREAMBLE: &str = "\
A participant addressed you directly. Answer them. Be conversational and \
supportive, adapt to their level and focus on any recent execution result. \
Decline only if the request is inappropriate. 15-40 words.";

/// Progress-check preamble with the red/green flag heuristics
pub const PROGRESS_CHECK_PREAMBLE: &str = "\
Judge whether the group is making adequate progress toward the stated problem.

Red flags (intervene):
- Repeating the same error across several runs
- Discussion drifting away from the problem
- Code that does not address what the problem asks
- Circular conversation or long confusion without new ideas
- Pursuing an approach that cannot meet the requirements

Green flags (stay quiet):
- Code is evolving toward a solution
- They are testing, debugging or reasoning about edge cases
- They discuss trade-offs or plan next steps
- Recent runs improve on earlier ones

Always fill in the justification, whichever way you decide. If you intervene, \
redirect them in one or two sentences without giving the solution.";

/// Reflection preamble
pub const REFLECTION_PREAMBLE: &str = "\
The session is in reflection mode. Respond to what the participants wrote \
about their learning with one short follow-up that deepens the reflection. \
Always intervene.";

/// Planning preamble
pub const PLANNING_PREAMBLE: &str = "\
Someone just started writing code. Check whether the group discussed a plan \
first: an approach, algorithm or strategy, steps, data structures, or \
questions about the problem. If they have a plan, do not intervene. If there \
was no planning discussion, ask for their approach before they dive into \
code. If there was some discussion but it is vague, ask them to break the \
approach down step by step.";

const CODE_PREVIEW_CHARS: usize = 1200;
const OUTPUT_PREVIEW_CHARS: usize = 200;

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// System prompt for a request
pub fn system_prompt(request: &DecisionRequest) -> String {
    SYSTEM_PREAMBLE.replace("{name}", &request.assistant_name)
}

fn trigger_preamble(trigger: TriggerKind) -> &'static str {
    match trigger {
        // Greetings are fixed text and never reach the capability
        TriggerKind::Idle | TriggerKind::Greeting => IDLE_PREAMBLE,
        TriggerKind::DirectMention => DIRECT_MENTION_PREAMBLE,
        TriggerKind::ProgressCheck => PROGRESS_CHECK_PREAMBLE,
        TriggerKind::Reflection => REFLECTION_PREAMBLE,
        TriggerKind::Planning => PLANNING_PREAMBLE,
    }
}

/// User prompt for a request
pub fn user_prompt(request: &DecisionRequest) -> String {
    let mut sections = vec![format!("## Task\n\n{}", trigger_preamble(request.trigger))];

    sections.push(format!(
        "## Problem\n\n- Title: {}\n- Description: {}\n- Language: {}",
        request.problem_title.as_deref().unwrap_or("General coding"),
        request
            .problem_description
            .as_deref()
            .unwrap_or("No specific problem"),
        request.language,
    ));

    let transcript = request.transcript();
    sections.push(format!(
        "## Recent Conversation\n\n{}",
        if transcript.is_empty() {
            "(no messages yet)"
        } else {
            &transcript
        }
    ));

    sections.push(if request.code.trim().is_empty() {
        "## Code\n\nNo code visible".to_string()
    } else {
        format!(
            "## Code\n\n```{}\n{}\n```",
            request.language,
            preview(&request.code, CODE_PREVIEW_CHARS)
        )
    });

    if let Some(exec) = &request.execution {
        sections.push(format!(
            "## Recent Execution ({})\n\n- Success: {}\n- Output: {}\n- Error: {}",
            exec.timestamp.format("%H:%M:%S"),
            exec.success,
            if exec.output.is_empty() {
                "No output".to_string()
            } else {
                preview(&exec.output, OUTPUT_PREVIEW_CHARS)
            },
            exec.error
                .as_deref()
                .map(|e| preview(e, OUTPUT_PREVIEW_CHARS))
                .unwrap_or_else(|| "No error".to_string()),
        ));
    }

    if request.trigger.uses_escalation_style() {
        let mut escalation = format!(
            "## What You Already Said\n\nEscalation level: {}\n{}",
            request.escalation.depth,
            request.escalation.style.instruction()
        );
        if !request.escalation.previous.is_empty() {
            escalation.push_str("\nDo not repeat any of these; be more concrete than the last one:\n");
            for text in &request.escalation.previous {
                escalation.push_str(&format!("- {}\n", text));
            }
        }
        sections.push(escalation);
    }

    sections.join("\n\n")
}
