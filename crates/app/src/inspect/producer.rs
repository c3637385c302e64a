//! Foreground inference loop: one frame in, one label into the cell.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use frame_ingest::{CaptureError, Frame};
use tracing::{debug, warn};

use crate::inspect::{cell::PredictionCell, classify::Classifier};

/// Bounded wait between frame polls when the source is quiet.
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);

const HEARTBEAT_EVERY_FRAMES: u64 = 30;

/// Classify frames until shutdown is observed.
///
/// A device that could never be opened (or a capture channel that dies) is
/// the one fatal condition: the shutdown flag is raised so the background
/// loops drain, and the error propagates to the caller. Everything else is
/// logged and survived.
pub fn run_producer(
    frames: &Receiver<Result<Frame, CaptureError>>,
    classifier: &dyn Classifier,
    cell: &PredictionCell,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let mut frames_classified: u64 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match frames.recv_timeout(FRAME_POLL_INTERVAL) {
            Ok(Ok(frame)) => {
                let label = match classifier.classify(&frame) {
                    Ok(label) => label,
                    Err(err) => {
                        warn!("classification failed: {err:#}");
                        continue;
                    }
                };
                cell.set(label);
                frames_classified += 1;
                metrics::counter!("inspect_frames_classified_total").increment(1);
                if label > 0 {
                    metrics::counter!("inspect_defect_frames_total").increment(1);
                }
                if frames_classified % HEARTBEAT_EVERY_FRAMES == 0 {
                    debug!(
                        "inference heartbeat: frame #{frames_classified}, label={label}, ts={}",
                        frame.timestamp_ms
                    );
                }
            }
            Ok(Err(err)) if err.is_open_failure() => {
                shutdown.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
            Ok(Err(err)) => {
                warn!("capture error: {err}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                shutdown.store(true, Ordering::SeqCst);
                bail!("capture channel closed unexpectedly");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    struct FixedClassifier(i64);

    impl Classifier for FixedClassifier {
        fn classify(&self, _frame: &Frame) -> Result<i64> {
            Ok(self.0)
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0u8; 28 * 28],
            width: 28,
            height: 28,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn publishes_labels_and_exits_on_shutdown() {
        let (tx, rx) = bounded(2);
        let cell = PredictionCell::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        tx.send(Ok(frame())).unwrap();
        let producer_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            producer_shutdown.store(true, Ordering::SeqCst);
        });

        run_producer(&rx, &FixedClassifier(5), &cell, &shutdown).unwrap();
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn open_failure_is_fatal_and_raises_shutdown() {
        let (tx, rx) = bounded(2);
        let cell = PredictionCell::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        tx.send(Err(CaptureError::Open {
            uri: "/dev/video0".into(),
        }))
        .unwrap();

        let result = run_producer(&rx, &FixedClassifier(0), &cell, &shutdown);
        assert!(result.is_err());
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn channel_death_is_fatal() {
        let (tx, rx) = bounded::<Result<Frame, CaptureError>>(2);
        let cell = PredictionCell::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        drop(tx);

        let result = run_producer(&rx, &FixedClassifier(0), &cell, &shutdown);
        assert!(result.is_err());
        assert!(shutdown.load(Ordering::SeqCst));
    }
}
