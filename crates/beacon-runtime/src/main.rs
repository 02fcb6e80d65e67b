//! # Beacon Runtime
//!
//! Hosts one tracker for the lifetime of the process.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logs + metrics)
//! 2. Load configuration from the environment
//! 3. Open JSON-file storage in `BEACON_DATA_DIR`
//! 4. Start a tracker from the configured profile, or restore the saved one
//! 5. Apply stdin commands until EOF
//! 6. Wait for the workers to go idle, shut down, print metrics if asked

mod commands;
mod config;

use anyhow::{bail, Context, Result};
use beacon_telemetry::{encode_metrics, init_telemetry, log_event, TelemetryConfig};
use beacon_tracking::adapters::{JsonFilePersistence, LoggingNetworkSender, LoggingPresentation};
use beacon_tracking::{Collaborators, Tracker, TrackingApi};
use commands::Command;
use config::RuntimeConfig;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const SUBSYSTEM: &str = "runtime";

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_component("runtime"))
        .context("failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env()?;
    let persistence = Arc::new(
        JsonFilePersistence::open(&config.data_dir)
            .with_context(|| format!("cannot open {}", config.data_dir.display()))?,
    );
    let collaborators = Collaborators::default()
        .with_persistence(persistence)
        .with_network(Arc::new(LoggingNetworkSender::new()))
        .with_presentation(Arc::new(LoggingPresentation));

    let tracker = match config.profile.clone() {
        Some(profile) => Tracker::start(profile, config.device.clone(), collaborators)?,
        None => match Tracker::restore(config.device.clone(), collaborators)? {
            Some(tracker) => tracker,
            None => bail!(
                "no saved profile; set BEACON_ORGANIZATION_ID, BEACON_PROFILE_ID and BEACON_DATA_SOURCE"
            ),
        },
    };

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                log_event!(
                    warn,
                    SUBSYSTEM,
                    "Skipping unreadable command",
                    line = line_no,
                    error = %e
                );
                continue;
            }
        };
        match command.apply(&tracker).await {
            Ok(Some(output)) => {
                stdout.write_all(output.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            Ok(None) => {}
            Err(e) => {
                log_event!(warn, SUBSYSTEM, "Command failed", line = line_no, error = %e);
            }
        }
    }

    tracker.wait_idle().await?;
    tracker.shutdown().await;

    if config.print_metrics {
        stdout.write_all(encode_metrics()?.as_bytes()).await?;
    }
    stdout.flush().await?;
    Ok(())
}
