//! Progress Detection — signals that the humans are unblocked
//!
//! Progress signals complement the escalation ladder: when the group moves
//! forward on its own, whatever the assistant said before no longer applies
//! and the next intervention starts from the gentlest style again.
//!
//! Only activity newer than the assistant's last utterance counts, so a
//! single successful run cannot keep clearing the record.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::RoomContext;

static PROGRESS_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(works|working now|it runs|fixed|solved|passes|passed|got it|figured it out|that did it)\b",
    )
    .expect("PROGRESS_KEYWORDS regex should compile")
});

/// Kinds of progress signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// A clean successful execution
    SuccessfulExecution { at: DateTime<Utc> },
    /// A human message containing a progress keyword
    ProgressKeyword { keyword: String, username: String },
    /// The group worked without the assistant for a long stretch
    IndependentActivity { minutes_since_response: i64 },
}

/// A detected progress signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSignal {
    pub kind: ProgressKind,
    pub description: String,
}

/// Thresholds for progress detection
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// How recent a successful execution must be
    pub execution_window: Duration,
    /// Silence from the assistant that counts as independent progress
    pub independent_window: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            execution_window: Duration::minutes(2),
            independent_window: Duration::minutes(5),
        }
    }
}

/// First progress keyword in `text`, if any
pub fn progress_keyword(text: &str) -> Option<String> {
    PROGRESS_KEYWORDS
        .find(text)
        .map(|m| m.as_str().to_lowercase())
}

#[derive(Debug, Clone, Default)]
pub struct ProgressDetector {
    config: ProgressConfig,
}

impl ProgressDetector {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Look for a progress signal in `ctx` as of `now`
    pub fn detect(&self, ctx: &RoomContext, now: DateTime<Utc>) -> Option<ProgressSignal> {
        let baseline = ctx.last_assistant_response;
        let is_new = |t: DateTime<Utc>| baseline.map(|b| t > b).unwrap_or(true);

        // Successful execution with no error inside the window
        if let Some(exec) = &ctx.last_execution {
            if exec.is_clean_success()
                && exec.is_recent(now, self.config.execution_window)
                && is_new(exec.timestamp)
            {
                return Some(ProgressSignal {
                    kind: ProgressKind::SuccessfulExecution { at: exec.timestamp },
                    description: "Code ran successfully with no errors".to_string(),
                });
            }
        }

        // Newest human message with a progress keyword
        let keyword_hit = ctx
            .messages
            .iter()
            .rev()
            .filter(|m| !m.is_assistant && is_new(m.timestamp))
            .find_map(|m| progress_keyword(&m.content).map(|k| (k, m.username.clone())));
        if let Some((keyword, username)) = keyword_hit {
            return Some(ProgressSignal {
                description: format!("{} reported progress (\"{}\")", username, keyword),
                kind: ProgressKind::ProgressKeyword { keyword, username },
            });
        }

        // Long independent stretch since the assistant last spoke
        if let Some(elapsed) = ctx.since_last_response(now) {
            if elapsed > self.config.independent_window {
                return Some(ProgressSignal {
                    kind: ProgressKind::IndependentActivity {
                        minutes_since_response: elapsed.num_minutes(),
                    },
                    description: format!(
                        "No assistant help needed for {} minutes",
                        elapsed.num_minutes()
                    ),
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatMessage, ExecutionSnapshot};

    fn ctx() -> RoomContext {
        RoomContext::new("room", 1)
    }

    fn execution(success: bool, error: Option<&str>, at: DateTime<Utc>) -> ExecutionSnapshot {
        ExecutionSnapshot {
            code: "print(1)".into(),
            output: "1".into(),
            error: error.map(String::from),
            success,
            duration_ms: 5,
            timestamp: at,
        }
    }

    #[test]
    fn test_keyword_matching() {
        assert_eq!(progress_keyword("It WORKS now!"), Some("works".to_string()));
        assert_eq!(progress_keyword("ok I fixed the loop"), Some("fixed".to_string()));
        assert_eq!(progress_keyword("we solved it"), Some("solved".to_string()));
        assert_eq!(progress_keyword("still broken"), None);
        // Whole words only
        assert_eq!(progress_keyword("networks are hard"), None);
    }

    #[test]
    fn test_successful_execution_is_progress() {
        let now = Utc::now();
        let mut c = ctx();
        c.last_execution = Some(execution(true, None, now - Duration::seconds(30)));
        let signal = ProgressDetector::default().detect(&c, now).unwrap();
        assert!(matches!(signal.kind, ProgressKind::SuccessfulExecution { .. }));
    }

    #[test]
    fn test_old_or_failed_execution_is_not_progress() {
        let now = Utc::now();
        let detector = ProgressDetector::default();

        let mut c = ctx();
        c.last_execution = Some(execution(true, None, now - Duration::minutes(3)));
        assert!(detector.detect(&c, now).is_none());

        c.last_execution = Some(execution(false, Some("NameError"), now));
        assert!(detector.detect(&c, now).is_none());

        c.last_execution = Some(execution(true, Some("Traceback"), now));
        assert!(detector.detect(&c, now).is_none());
    }

    #[test]
    fn test_execution_before_last_response_is_ignored() {
        let now = Utc::now();
        let mut c = ctx();
        c.last_execution = Some(execution(true, None, now - Duration::seconds(60)));
        c.last_assistant_response = Some(now - Duration::seconds(10));
        assert!(ProgressDetector::default().detect(&c, now).is_none());
    }

    #[test]
    fn test_keyword_in_human_message() {
        let now = Utc::now();
        let mut c = ctx();
        c.messages.push(ChatMessage::new("u1", "Alice", "yes it works"));
        let signal = ProgressDetector::default().detect(&c, now).unwrap();
        assert_eq!(
            signal.kind,
            ProgressKind::ProgressKeyword {
                keyword: "works".to_string(),
                username: "Alice".to_string()
            }
        );
    }

    #[test]
    fn test_assistant_keywords_do_not_count() {
        let now = Utc::now();
        let mut c = ctx();
        c.messages
            .push(ChatMessage::assistant("ai", "Bob", "Check whether your loop works"));
        assert!(ProgressDetector::default().detect(&c, now).is_none());
    }

    #[test]
    fn test_independent_activity() {
        let now = Utc::now();
        let mut c = ctx();
        c.last_assistant_response = Some(now - Duration::minutes(6));
        let signal = ProgressDetector::default().detect(&c, now).unwrap();
        assert!(matches!(
            signal.kind,
            ProgressKind::IndependentActivity {
                minutes_since_response: 6
            }
        ));

        c.last_assistant_response = Some(now - Duration::minutes(4));
        assert!(ProgressDetector::default().detect(&c, now).is_none());
    }
}
