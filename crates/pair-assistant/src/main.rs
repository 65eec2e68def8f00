//! Pair Assistant driver
//!
//! Runs the intervention engine against a JSON-lines stream: activity
//! signals and control commands on stdin, deliveries on stdout, logs on
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! # Settings from a file, idle delay overridden
//! pair-assistant --settings settings.toml --idle-delay 8 < session.jsonl
//!
//! # Keep running 60s after input ends so pending timers can fire
//! OPENAI_API_KEY=... pair-assistant --linger 60 --events < session.jsonl
//! ```

mod config;
mod stdio;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pair_intervention::{DecisionAdapter, DecisionCapability, InterventionEngine, OpenAiCapability};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use config::{Args, DriverConfig};
use stdio::{parse_line, ControlCommand, Inbound, Outbound, StdioPort};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DriverConfig::resolve(&args)?;
    let capability: Option<Arc<dyn DecisionCapability>> = if config.capability.is_configured() {
        let client = OpenAiCapability::new(config.capability.clone())
            .context("Failed to build decision client")?;
        info!(
            model = %config.capability.model,
            base_url = %config.capability.base_url,
            "Decision capability configured"
        );
        Some(Arc::new(client))
    } else {
        warn!("OPENAI_API_KEY not set, running without a decision capability");
        None
    };
    let adapter = DecisionAdapter::new(capability).with_timeout(config.capability.timeout);

    let port = Arc::new(StdioPort::new());
    let engine = InterventionEngine::start(config.engine, adapter, port.clone())
        .context("Failed to start intervention engine")?;

    if args.events {
        spawn_event_writer(&engine, port.clone());
    }

    run(&engine, &port).await?;

    if args.linger > 0 {
        info!(seconds = args.linger, "Input closed, waiting for pending timers");
        tokio::time::sleep(Duration::from_secs(args.linger)).await;
    }
    engine.shutdown();
    Ok(())
}

/// Feed stdin to the engine until EOF or a shutdown command
async fn run(engine: &Arc<InterventionEngine>, port: &StdioPort) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        let inbound = match parse_line(&line) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "Unparseable input line");
                port.emit(&Outbound::Error {
                    message: format!("line {}: {}", line_no, e),
                })?;
                continue;
            }
        };

        match inbound {
            Inbound::Signal(signal) => {
                port.observe(&signal);
                if let Err(e) = engine.handle(signal) {
                    warn!(line = line_no, code = e.code(), error = %e, "Signal rejected");
                    port.emit(&Outbound::Error {
                        message: format!("line {}: {}", line_no, e),
                    })?;
                }
            }
            Inbound::Control(ControlCommand::UpdateSettings { settings }) => {
                match engine.update_settings(&settings) {
                    Ok(settings) => port.emit(&Outbound::Settings {
                        settings: &settings,
                    })?,
                    Err(e) => port.emit(&Outbound::Error {
                        message: format!("line {}: {}", line_no, e),
                    })?,
                }
            }
            Inbound::Control(ControlCommand::RoomSummary { room_id }) => {
                let summary = engine.room_state_summary(&room_id);
                port.emit(&Outbound::RoomSummary { summary: &summary })?;
            }
            Inbound::Control(ControlCommand::Shutdown) => {
                info!("Shutdown requested");
                break;
            }
        }
    }
    Ok(())
}

/// Mirror engine events to stdout
fn spawn_event_writer(engine: &Arc<InterventionEngine>, port: Arc<StdioPort>) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = port.emit(&Outbound::Event { event: &event }) {
                        warn!(error = %e, "Failed to write event");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event writer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
