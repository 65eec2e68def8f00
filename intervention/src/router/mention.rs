//! Direct-mention detection

use regex::Regex;

use crate::error::{InterventionError, InterventionResult};

/// Characters that may sit next to a handle. Apostrophes and hyphens are
/// excluded so "Bob's" or "bob-approved" are not mentions.
const BOUNDARY: &str = r#"[\s,.!?;:()\[\]"]"#;

/// Recognises messages addressed to the assistant.
///
/// Case-insensitive match on `@ai`, `@<name>` and `<name>` (which covers
/// `hey <name>`), delimited by whitespace, punctuation or the ends of the
/// message.
#[derive(Debug, Clone)]
pub struct MentionDetector {
    pattern: Regex,
}

impl MentionDetector {
    pub fn new(assistant_name: &str) -> InterventionResult<Self> {
        let name = assistant_name.trim();
        if name.is_empty() {
            return Err(InterventionError::invalid_configuration(
                "assistant_name",
                "must not be empty",
            ));
        }
        let name = regex::escape(name);
        let pattern = Regex::new(&format!(
            r"(?i)(?:^|{b})(?:@ai|@?{name})(?:$|{b})",
            b = BOUNDARY,
            name = name
        ))
        .map_err(|e| InterventionError::invalid_configuration("assistant_name", e.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn is_mention(&self, content: &str) -> bool {
        self.pattern.is_match(content)
    }
}
