//! Latest-prediction slot shared between the producer and the two reader
//! loops. Holds exactly one label; staleness is fine, tearing is not.

use std::sync::atomic::{AtomicI64, Ordering};

/// Single-slot cell holding the most recent classification label.
///
/// One writer (the inference producer), any number of readers. Reads and
/// writes are whole-value atomic with no further ordering contract: a reader
/// always observes some label a completed `set` stored, possibly a stale one.
pub struct PredictionCell {
    label: AtomicI64,
}

impl PredictionCell {
    /// Cell starts at label 0 ("no defect") until the first prediction lands.
    pub fn new() -> Self {
        Self {
            label: AtomicI64::new(0),
        }
    }

    pub fn set(&self, label: i64) {
        self.label.store(label, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.label.load(Ordering::Relaxed)
    }
}

impl Default for PredictionCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_no_defect() {
        let cell = PredictionCell::new();
        assert_eq!(cell.get(), 0);
    }

    #[test]
    fn latest_set_wins() {
        let cell = PredictionCell::new();
        cell.set(3);
        cell.set(5);
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn concurrent_readers_never_observe_torn_values() {
        let cell = Arc::new(PredictionCell::new());
        let writer_cell = cell.clone();

        let writer = thread::spawn(move || {
            for _ in 0..10_000 {
                // Alternate between two values with very different bit
                // patterns so an interleaved partial store would show up.
                writer_cell.set(0);
                writer_cell.set(i64::MAX);
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let value = cell.get();
                        assert!(value == 0 || value == i64::MAX);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
