//! Startup and shutdown coordination for the three loops.
//!
//! The reporter and the control link run as named background threads; the
//! inference producer runs in the foreground because it owns the camera.
//! Whatever ends the producer (user interrupt or the fatal device error),
//! the shutdown flag is raised and both background threads are joined
//! before this function returns.

use std::{
    io,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::inspect::{
    InspectConfig,
    cell::PredictionCell,
    classify::{Classifier, MODEL_EDGE_PIXELS},
    control::{HttpConnector, LinkSettings, ValueIds, run_control_link},
    feed::spawn_feed_reader,
    producer::run_producer,
    reporter::run_reporter,
    sink::InfluxSink,
};

pub fn run(config: InspectConfig, classifier: Box<dyn Classifier>) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler({
            let handler_shutdown = handler_shutdown.clone();
            move || {
                handler_shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let cell = Arc::new(PredictionCell::new());

    // Sink and connector are built up front so a bad endpoint configuration
    // fails before any thread starts.
    let sink = InfluxSink::new(
        &config.influx_url,
        &config.influx_org,
        &config.influx_bucket,
        &config.influx_token,
        config.connect_timeout,
    )
    .context("failed to build time-series sink")?;
    let connector = HttpConnector::new(
        &config.control_url,
        ValueIds {
            defect_code: config.defect_value_id.clone(),
            status: config.status_value_id.clone(),
            stop: config.stop_value_id.clone(),
        },
        config.connect_timeout,
    )
    .context("failed to build control connector")?;

    let reporter_handle = {
        let cell = cell.clone();
        let shutdown = shutdown.clone();
        let sensor_port = config.sensor_port.clone();
        let interval = config.report_interval;
        spawn_thread("telemetry-reporter", move || {
            let feed = match spawn_feed_reader(&sensor_port) {
                Ok(rx) => Some(rx),
                Err(err) => {
                    warn!("sensor feed unavailable ({err:#}); reporting machine status only");
                    None
                }
            };
            run_reporter(&sink, feed.as_ref(), &cell, &shutdown, interval);
            info!("telemetry reporter shut down");
        })
        .context("failed to spawn telemetry reporter")?
    };

    let control_handle = {
        let cell = cell.clone();
        let shutdown = shutdown.clone();
        let settings = LinkSettings {
            tick_interval: config.tick_interval,
            reconnect_backoff: config.reconnect_backoff,
            critical_defect: config.critical_defect,
        };
        spawn_thread("control-link", move || {
            // The link is cooperative internally; a current-thread runtime
            // keeps it off the rest of the process.
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    runtime.block_on(run_control_link(&connector, &cell, &shutdown, &settings));
                }
                Err(err) => {
                    error!("failed to build control-link runtime: {err}");
                    shutdown.store(true, Ordering::SeqCst);
                }
            }
        })
        .context("failed to spawn control link")?
    };

    info!(
        "inspection node running (camera {}, critical defect code {})",
        config.camera_uri, config.critical_defect
    );

    let result = run_foreground(&config, classifier.as_ref(), &cell, &shutdown);

    shutdown.store(true, Ordering::SeqCst);
    if reporter_handle.join().is_err() {
        error!("telemetry reporter thread panicked");
    }
    if control_handle.join().is_err() {
        error!("control link thread panicked");
    }
    info!("inspection node stopped");

    result
}

fn run_foreground(
    config: &InspectConfig,
    classifier: &dyn Classifier,
    cell: &PredictionCell,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let edge = MODEL_EDGE_PIXELS as i32;
    let frames = match frame_ingest::spawn_camera_reader(&config.camera_uri, (edge, edge)) {
        Ok(frames) => frames,
        Err(err) => {
            shutdown.store(true, Ordering::SeqCst);
            return Err(err).context("failed to start camera capture");
        }
    };

    run_producer(&frames, classifier, cell, shutdown)
}

/// Spawn a named thread that inherits the current tracing dispatcher.
fn spawn_thread<F>(name: &str, f: F) -> io::Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
