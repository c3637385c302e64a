//! Environment sensor feed: line-delimited JSON from a serial device.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TrySendError, bounded};
use serde::Deserialize;

/// One reading from the environment sensor. Lives for a single reporting
/// cycle; never persisted.
#[derive(Debug, Deserialize, PartialEq)]
pub struct EnvironmentSample {
    pub temperature: f64,
    pub humidity: f64,
}

/// Parse one feed line. Anything that is not a well-formed sample is an
/// error the caller drops without retrying.
pub fn parse_sample(line: &str) -> Result<EnvironmentSample, serde_json::Error> {
    serde_json::from_str(line)
}

/// Spawns a background thread reading lines from the sensor device.
///
/// Returns an error when the device cannot be opened; the reporter then runs
/// machine-status-only. Lines arriving faster than the reporter drains them
/// are dropped — only the freshest reading matters.
pub fn spawn_feed_reader(path: &Path) -> Result<Receiver<String>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open sensor port {}", path.display()))?;
    let (tx, rx) = bounded(8);

    thread::Builder::new()
        .name("sensor-feed".into())
        .spawn(move || {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                match tx.try_send(line) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        })
        .context("failed to spawn sensor feed thread")?;

    Ok(rx)
}
