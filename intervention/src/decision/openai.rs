//! OpenAI-compatible chat-completions capability
//!
//! Asks for a JSON object response and parses it into a structured decision.
//! Anything that does not parse is a `Malformed` error, which the adapter
//! turns into a decline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{DecisionError, DecisionResult};
use super::prompts;
use super::request::DecisionRequest;
use super::types::{Decision, DecisionOutcome, TriggerKind};
use super::DecisionCapability;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ASSISTANT_NAME: &str = "Bob";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Capability configuration, normally read from the environment
#[derive(Debug, Clone)]
pub struct CapabilityConfig {
    /// Absent means the capability is unavailable
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub assistant_name: String,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
        }
    }
}

impl CapabilityConfig {
    /// Load from `OPENAI_API_KEY` and the `PAIR_ASSISTANT_*` variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout = match non_empty("PAIR_ASSISTANT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(value = %raw, "Ignoring invalid PAIR_ASSISTANT_TIMEOUT_SECS");
                    defaults.timeout
                }
            },
            None => defaults.timeout,
        };

        Self {
            api_key: non_empty("OPENAI_API_KEY"),
            base_url: non_empty("PAIR_ASSISTANT_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            model: non_empty("PAIR_ASSISTANT_MODEL").unwrap_or(defaults.model),
            timeout,
            assistant_name: non_empty("PAIR_ASSISTANT_NAME").unwrap_or(defaults.assistant_name),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// JSON object the model is asked to reply with
#[derive(Debug, Deserialize)]
struct CapabilityReply {
    intervene: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    justification: Option<String>,
}

/// Parse the model's content into an outcome
pub(crate) fn parse_reply(content: &str) -> DecisionResult<DecisionOutcome> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let reply: CapabilityReply =
        serde_json::from_str(trimmed).map_err(|e| DecisionError::Malformed(e.to_string()))?;

    let decision = if reply.intervene {
        Decision::intervene(reply.message)
    } else {
        Decision::Decline
    };
    Ok(DecisionOutcome {
        decision,
        justification: reply.justification.filter(|j| !j.trim().is_empty()),
    })
}

fn max_tokens(trigger: TriggerKind) -> u32 {
    match trigger {
        TriggerKind::DirectMention | TriggerKind::ProgressCheck => 200,
        _ => 150,
    }
}

fn temperature(trigger: TriggerKind) -> f32 {
    match trigger {
        TriggerKind::Planning | TriggerKind::ProgressCheck => 0.3,
        _ => 0.7,
    }
}

pub struct OpenAiCapability {
    config: CapabilityConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCapability {
    pub fn new(config: CapabilityConfig) -> DecisionResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DecisionError::Unavailable("OPENAI_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DecisionError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn config(&self) -> &CapabilityConfig {
        &self.config
    }
}

#[async_trait]
impl DecisionCapability for OpenAiCapability {
    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<DecisionOutcome> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": prompts::system_prompt(request)},
                {"role": "user", "content": prompts::user_prompt(request)}
            ],
            "response_format": {"type": "json_object"},
            "max_tokens": max_tokens(request.trigger),
            "temperature": temperature(request.trigger)
        });

        debug!(
            room_id = %request.room_id,
            trigger = %request.trigger,
            model = %self.config.model,
            prompt_version = prompts::PROMPT_VERSION,
            "Requesting decision"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Status { status, body });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DecisionError::Malformed("response has no content".to_string()))?;

        parse_reply(&content)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("PAIR_ASSISTANT_BASE_URL", "http://localhost:8080/v1/"),
            ("PAIR_ASSISTANT_TIMEOUT_SECS", "7"),
            ("PAIR_ASSISTANT_NAME", "Ada"),
        ]
        .into_iter()
        .collect();
        let config = CapabilityConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert!(config.is_configured());
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.assistant_name, "Ada");
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        let config = CapabilityConfig::from_lookup(|_| None);
        assert!(!config.is_configured());
        assert!(matches!(
            OpenAiCapability::new(config),
            Err(DecisionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = CapabilityConfig::from_lookup(|k| {
            (k == "PAIR_ASSISTANT_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_parse_reply() {
        let outcome = parse_reply(
            r#"{"intervene": true, "message": "What happens when n is 0?", "justification": "stuck on base case"}"#,
        )
        .unwrap();
        assert_eq!(outcome.decision.text(), Some("What happens when n is 0?"));
        assert_eq!(outcome.justification.as_deref(), Some("stuck on base case"));

        let outcome = parse_reply("```json\n{\"intervene\": false}\n```").unwrap();
        assert_eq!(outcome.decision, Decision::Decline);
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(parse_reply("YES|try a dict"), Err(DecisionError::Malformed(_))));
        // Intervene with an empty message degrades to decline
        let outcome = parse_reply(r#"{"intervene": true, "message": ""}"#).unwrap();
        assert_eq!(outcome.decision, Decision::Decline);
    }
}
