//! Reconnect state machine and the polling protocol that enforces the
//! critical-defect lockout.
//!
//! Outer loop: Disconnected → Connecting → Connected, with a fixed backoff
//! after every failure and unbounded retries. Inner loop: one tick per
//! interval while connected. Any I/O error inside a tick discards the whole
//! session and falls back to the outer loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{info, warn};

use super::{STATUS_RUNNING, STATUS_STOPPED_CRITICAL};
use super::endpoint::{Connector, ControlError, ControlSession};
use crate::inspect::cell::PredictionCell;

#[derive(Clone, Debug)]
pub struct LinkSettings {
    pub tick_interval: Duration,
    pub reconnect_backoff: Duration,
    pub critical_defect: i64,
}

/// Drive the control link until shutdown is observed.
///
/// Connection failures are never fatal: every attempt is independent and
/// separated by the fixed backoff, whether the failure happened during the
/// handshake or mid-session.
pub async fn run_control_link<C: Connector>(
    connector: &C,
    cell: &PredictionCell,
    shutdown: &Arc<AtomicBool>,
    settings: &LinkSettings,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match connector.connect().await {
            Ok(mut session) => {
                info!("control link connected");
                metrics::counter!("control_link_connects_total").increment(1);
                match run_connected(&mut session, cell, shutdown, settings).await {
                    Ok(()) => break, // shutdown observed
                    Err(err) => {
                        warn!("control link lost ({err}); reconnecting after backoff");
                        metrics::counter!("control_link_drops_total").increment(1);
                    }
                }
            }
            Err(err) => {
                warn!("control connection failed ({err}); retrying after backoff");
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(settings.reconnect_backoff).await;
    }

    info!("control link shut down");
}

/// Inner polling loop; returns `Ok` only when shutdown is observed.
async fn run_connected<S: ControlSession>(
    session: &mut S,
    cell: &PredictionCell,
    shutdown: &Arc<AtomicBool>,
    settings: &LinkSettings,
) -> Result<(), ControlError> {
    while !shutdown.load(Ordering::SeqCst) {
        let label = cell.get();
        protocol_tick(session, label, settings.critical_defect).await?;
        tokio::time::sleep(settings.tick_interval).await;
    }
    Ok(())
}

/// One protocol tick.
///
/// The defect-code write always happens (the link heartbeat). The status
/// write is suppressed when the remote already reports the desired state;
/// the remote is re-read every tick, so manual overrides on the endpoint
/// side are detected and corrected within one tick. Re-issuing the lockout
/// is safe: the stop and status writes are idempotent downstream.
pub(crate) async fn protocol_tick<S: ControlSession>(
    session: &mut S,
    label: i64,
    critical_defect: i64,
) -> Result<(), ControlError> {
    session.write_defect_code(label).await?;

    let remote_status = session.read_status().await?;

    if label == critical_defect && remote_status != STATUS_STOPPED_CRITICAL {
        warn!("critical defect {label} detected; engaging line stop");
        metrics::counter!("control_link_lockouts_total").increment(1);
        session.write_stop(true).await?;
        session.write_status(STATUS_STOPPED_CRITICAL).await?;
    } else if label != critical_defect && remote_status != STATUS_RUNNING {
        info!("defect cleared (label={label}); commanding status back to running");
        session.write_status(STATUS_RUNNING).await?;
    }

    Ok(())
}
