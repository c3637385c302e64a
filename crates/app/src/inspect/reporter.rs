//! Periodic telemetry loop: one environment point (when the sensor has
//! produced a line) and one machine-status point per cycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::Receiver;
use tracing::warn;

use crate::inspect::{
    cell::PredictionCell,
    feed::parse_sample,
    sink::StatusSink,
};

/// Run reporting cycles until shutdown is observed. Sink and feed failures
/// are never fatal here; a lost point is lost.
pub fn run_reporter(
    sink: &dyn StatusSink,
    feed: Option<&Receiver<String>>,
    cell: &PredictionCell,
    shutdown: &Arc<AtomicBool>,
    interval: Duration,
) {
    while !shutdown.load(Ordering::SeqCst) {
        run_cycle(sink, feed, cell);
        thread::sleep(interval);
    }
}

/// One reporting cycle. The two writes are independent: an environment
/// failure never blocks the machine-status point, and neither is retried.
pub(crate) fn run_cycle(
    sink: &dyn StatusSink,
    feed: Option<&Receiver<String>>,
    cell: &PredictionCell,
) {
    if let Some(feed) = feed {
        if let Ok(line) = feed.try_recv() {
            match parse_sample(&line) {
                Ok(sample) => match sink.write_environment(&sample) {
                    Ok(()) => {
                        metrics::counter!("telemetry_points_written_total", "point" => "environment")
                            .increment(1);
                    }
                    Err(err) => warn!("environment write failed: {err}"),
                },
                Err(err) => {
                    metrics::counter!("telemetry_malformed_lines_total").increment(1);
                    warn!("sensor line is not valid JSON ({err}): {line}");
                }
            }
        }
    }

    let defect_detected = cell.get() > 0;
    match sink.write_machine_status(defect_detected) {
        Ok(()) => {
            metrics::counter!("telemetry_points_written_total", "point" => "machine_status")
                .increment(1);
        }
        Err(err) => warn!("machine-status write failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::feed::EnvironmentSample;
    use crate::inspect::sink::SinkError;
    use crossbeam_channel::unbounded;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        environment: Mutex<Vec<EnvironmentSample>>,
        machine_status: Mutex<Vec<bool>>,
        fail_environment: bool,
    }

    impl StatusSink for RecordingSink {
        fn write_environment(&self, sample: &EnvironmentSample) -> Result<(), SinkError> {
            if self.fail_environment {
                return Err(SinkError::Rejected { status: 503 });
            }
            self.environment.lock().unwrap().push(EnvironmentSample {
                temperature: sample.temperature,
                humidity: sample.humidity,
            });
            Ok(())
        }

        fn write_machine_status(&self, defect_detected: bool) -> Result<(), SinkError> {
            self.machine_status.lock().unwrap().push(defect_detected);
            Ok(())
        }
    }

    #[test]
    fn reports_both_points_when_a_sample_is_pending() {
        let sink = RecordingSink::default();
        let (tx, rx) = unbounded();
        let cell = PredictionCell::new();
        cell.set(3);
        tx.send(r#"{"temperature":23.5,"humidity":48.2}"#.to_string())
            .unwrap();

        run_cycle(&sink, Some(&rx), &cell);

        assert_eq!(sink.environment.lock().unwrap().len(), 1);
        assert_eq!(sink.machine_status.lock().unwrap().as_slice(), &[true]);
    }

    #[test]
    fn malformed_line_is_dropped_but_machine_status_still_written() {
        let sink = RecordingSink::default();
        let (tx, rx) = unbounded();
        let cell = PredictionCell::new();
        tx.send("garbage".to_string()).unwrap();

        run_cycle(&sink, Some(&rx), &cell);

        assert!(sink.environment.lock().unwrap().is_empty());
        assert_eq!(sink.machine_status.lock().unwrap().as_slice(), &[false]);
        // The bad line is gone for good.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn environment_write_failure_does_not_block_machine_status() {
        let sink = RecordingSink {
            fail_environment: true,
            ..RecordingSink::default()
        };
        let (tx, rx) = unbounded();
        let cell = PredictionCell::new();
        tx.send(r#"{"temperature":20.0,"humidity":50.0}"#.to_string())
            .unwrap();

        run_cycle(&sink, Some(&rx), &cell);

        assert_eq!(sink.machine_status.lock().unwrap().len(), 1);
    }

    #[test]
    fn runs_without_a_sensor_feed() {
        let sink = RecordingSink::default();
        let cell = PredictionCell::new();

        run_cycle(&sink, None, &cell);

        assert!(sink.environment.lock().unwrap().is_empty());
        assert_eq!(sink.machine_status.lock().unwrap().len(), 1);
    }

    #[test]
    fn observes_shutdown_within_one_cycle() {
        let sink = RecordingSink::default();
        let cell = PredictionCell::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                run_reporter(&sink, None, &cell, &shutdown, Duration::from_millis(20));
            })
        };

        thread::sleep(Duration::from_millis(30));
        shutdown.store(true, Ordering::SeqCst);

        let started = std::time::Instant::now();
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
