//! Visual-inspection edge node: classifies camera frames, reports machine
//! and environment telemetry, and drives the line-control endpoint.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `cell`: Latest-prediction slot shared between the loops.
//! - `classify`: Classification capability and the model-backed backend.
//! - `producer`: Foreground frame → label loop (owns the camera).
//! - `feed`: Environment sensor line feed and sample parsing.
//! - `sink`: Time-series sink (InfluxDB line protocol over HTTP).
//! - `reporter`: Periodic telemetry reporting loop.
//! - `control`: Control-link session, reconnect machine, lockout protocol.
//! - `lifecycle`: Starts the three loops and coordinates shutdown.

pub use config::InspectConfig;

use anyhow::Result;

use crate::inspect::classify::Classifier;

mod cell;
mod classify;
mod config;
mod control;
mod feed;
mod lifecycle;
mod producer;
mod reporter;
mod sink;

/// Parse flags and run the inspection node until shutdown.
pub fn run_from_args(args: &[String]) -> Result<()> {
    let config = InspectConfig::from_args(args)?;
    let classifier = build_classifier(&config)?;
    lifecycle::run(config, classifier)
}

pub fn print_help() {
    println!("{}", config::INSPECT_USAGE);
}

#[cfg(feature = "with-tch")]
fn build_classifier(config: &InspectConfig) -> Result<Box<dyn Classifier>> {
    let classifier = classify::ModelClassifier::load(&config.model_path)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "with-tch"))]
fn build_classifier(_config: &InspectConfig) -> Result<Box<dyn Classifier>> {
    anyhow::bail!(
        "this build has no classifier backend; rebuild with `--features with-tch`"
    )
}
