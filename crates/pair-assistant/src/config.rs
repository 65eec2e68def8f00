//! Command-line and file configuration for the driver

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use pair_intervention::{CapabilityConfig, EngineConfig, InterventionSettings, SettingsUpdate};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML file with intervention settings
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Seconds of silence before an idle response (overrides the settings file)
    #[arg(long)]
    pub idle_delay: Option<u64>,

    /// Seconds before a room's progress check (overrides the settings file)
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Never arm progress-check timers
    #[arg(long, default_value_t = false)]
    pub no_progress_check: bool,

    /// Never arm idle-response timers
    #[arg(long, default_value_t = false)]
    pub no_idle: bool,

    /// Seconds to keep running after stdin closes, so pending timers can fire
    #[arg(long, default_value_t = 0)]
    pub linger: u64,

    /// Also write engine events to stdout
    #[arg(long, default_value_t = false)]
    pub events: bool,
}

impl Args {
    /// Flag overrides as a partial settings update
    pub fn overrides(&self) -> SettingsUpdate {
        SettingsUpdate {
            idle_intervention_enabled: self.no_idle.then_some(false),
            idle_intervention_delay: self.idle_delay,
            progress_check_enabled: self.no_progress_check.then_some(false),
            progress_check_interval: self.progress_interval,
        }
    }
}

/// Read settings from a TOML file; missing keys take their defaults
pub fn load_settings(path: &Path) -> Result<InterventionSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    parse_settings(&content)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))
}

fn parse_settings(content: &str) -> Result<InterventionSettings> {
    let settings: InterventionSettings = toml::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}

/// Everything the driver needs to start the engine
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub engine: EngineConfig,
    pub capability: CapabilityConfig,
}

impl DriverConfig {
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut settings = match &args.settings {
            Some(path) => load_settings(path)?,
            None => InterventionSettings::default(),
        };
        settings
            .apply(&args.overrides())
            .context("Invalid settings override on the command line")?;

        let capability = CapabilityConfig::from_env();
        let engine = EngineConfig::default()
            .with_settings(settings)
            .with_assistant_name(capability.assistant_name.clone());
        Ok(Self { engine, capability })
    }
}
