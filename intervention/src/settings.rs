//! Intervention settings and gating policy
//!
//! `InterventionSettings` is the operator-facing object. Its keys are part of
//! the external interface and keep their snake_case names on the wire.
//! `GatingPolicy` holds the engine-internal thresholds that decide whether an
//! idle firing is allowed to consult the decision capability at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InterventionError, InterventionResult};

/// Allowed range for `idle_intervention_delay`, in seconds
pub const IDLE_DELAY_RANGE: (u64, u64) = (1, 60);

/// Allowed range for `progress_check_interval`, in seconds
pub const PROGRESS_INTERVAL_RANGE: (u64, u64) = (10, 300);

/// Operator-facing intervention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionSettings {
    /// Whether idle-response timers are armed at all
    pub idle_intervention_enabled: bool,
    /// Seconds of silence before an idle-response timer fires
    pub idle_intervention_delay: u64,
    /// Whether progress-check timers are armed at all
    pub progress_check_enabled: bool,
    /// Seconds between a room becoming active and its progress check
    pub progress_check_interval: u64,
}

impl Default for InterventionSettings {
    fn default() -> Self {
        Self {
            idle_intervention_enabled: true,
            idle_intervention_delay: 5,
            progress_check_enabled: true,
            progress_check_interval: 45,
        }
    }
}

impl InterventionSettings {
    /// Idle-response delay as a duration
    pub fn idle_delay(&self) -> Duration {
        Duration::from_secs(self.idle_intervention_delay)
    }

    /// Progress-check interval as a duration
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_check_interval)
    }

    /// Check every field against its documented range
    pub fn validate(&self) -> InterventionResult<()> {
        check_range(
            "idle_intervention_delay",
            self.idle_intervention_delay,
            IDLE_DELAY_RANGE,
        )?;
        check_range(
            "progress_check_interval",
            self.progress_check_interval,
            PROGRESS_INTERVAL_RANGE,
        )?;
        Ok(())
    }

    /// Apply a partial update.
    ///
    /// The update is validated as a whole; on error `self` is left untouched.
    pub fn apply(&mut self, update: &SettingsUpdate) -> InterventionResult<SettingsChange> {
        let mut next = self.clone();
        if let Some(v) = update.idle_intervention_enabled {
            next.idle_intervention_enabled = v;
        }
        if let Some(v) = update.idle_intervention_delay {
            next.idle_intervention_delay = v;
        }
        if let Some(v) = update.progress_check_enabled {
            next.progress_check_enabled = v;
        }
        if let Some(v) = update.progress_check_interval {
            next.progress_check_interval = v;
        }
        next.validate()?;

        let change = SettingsChange {
            idle_disabled: self.idle_intervention_enabled && !next.idle_intervention_enabled,
            progress_check_disabled: self.progress_check_enabled && !next.progress_check_enabled,
        };
        *self = next;
        Ok(change)
    }
}

fn check_range(key: &str, value: u64, (min, max): (u64, u64)) -> InterventionResult<()> {
    if value < min || value > max {
        return Err(InterventionError::invalid_configuration(
            key,
            format!("{} is outside [{}, {}]", value, min, max),
        ));
    }
    Ok(())
}

/// Partial settings update as received from an operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub idle_intervention_enabled: Option<bool>,
    pub idle_intervention_delay: Option<u64>,
    pub progress_check_enabled: Option<bool>,
    pub progress_check_interval: Option<u64>,
}

/// Which timer classes an applied update switched off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub idle_disabled: bool,
    pub progress_check_disabled: bool,
}

/// Thresholds that gate timer firings before the decision capability is called
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingPolicy {
    /// Minimum time since the last assistant utterance for an idle firing
    pub response_cooldown: Duration,
    /// Minimum messages in the window for an idle firing
    pub min_messages_before_response: usize,
    /// Minimum messages in the window for a progress check
    pub progress_check_min_messages: usize,
    /// Fixed delay of the reflection-response timer
    pub reflection_delay: Duration,
    /// Pause between a session start and the assistant's greeting
    pub greeting_delay: Duration,
    /// How recent an execution must be to be included in a decision request
    pub execution_context_window: Duration,
    /// How many recent messages a decision request carries
    pub recent_messages_in_request: usize,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self {
            response_cooldown: Duration::from_secs(15),
            min_messages_before_response: 1,
            progress_check_min_messages: 3,
            reflection_delay: Duration::from_secs(5),
            greeting_delay: Duration::from_secs(1),
            execution_context_window: Duration::from_secs(30),
            recent_messages_in_request: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = InterventionSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.idle_delay(), Duration::from_secs(5));
        assert_eq!(settings.progress_interval(), Duration::from_secs(45));
    }

    #[test]
    fn test_out_of_range_update_keeps_prior_settings() {
        let mut settings = InterventionSettings::default();
        let update = SettingsUpdate {
            idle_intervention_enabled: Some(false),
            idle_intervention_delay: Some(61),
            ..Default::default()
        };

        let err = settings.apply(&update).unwrap_err();
        assert!(matches!(
            err,
            InterventionError::InvalidConfiguration { ref key, .. } if key == "idle_intervention_delay"
        ));
        assert_eq!(settings, InterventionSettings::default());
    }

    #[test]
    fn test_progress_interval_bounds() {
        let mut settings = InterventionSettings::default();
        for bad in [9, 301] {
            let update = SettingsUpdate {
                progress_check_interval: Some(bad),
                ..Default::default()
            };
            assert!(settings.apply(&update).is_err());
        }
        for good in [10, 300] {
            let update = SettingsUpdate {
                progress_check_interval: Some(good),
                ..Default::default()
            };
            assert!(settings.apply(&update).is_ok());
            assert_eq!(settings.progress_check_interval, good);
        }
    }

    #[test]
    fn test_disable_reports_change() {
        let mut settings = InterventionSettings::default();
        let change = settings
            .apply(&SettingsUpdate {
                progress_check_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(change.progress_check_disabled);
        assert!(!change.idle_disabled);

        // Disabling again is not a change
        let change = settings
            .apply(&SettingsUpdate {
                progress_check_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(!change.progress_check_disabled);
    }

    #[test]
    fn test_settings_wire_format() {
        let json = r#"{"idle_intervention_enabled": false, "idle_intervention_delay": 10}"#;
        let settings: InterventionSettings = serde_json::from_str(json).unwrap();
        assert!(!settings.idle_intervention_enabled);
        assert_eq!(settings.idle_intervention_delay, 10);
        assert_eq!(settings.progress_check_interval, 45);
    }
}
