//! Observable migration progress.
//!
//! A single writer (the migration worker, plus the caller for the final
//! 90 -> 100 step) publishes a value in `[0, 100]` and an "in progress" flag.
//! Any number of readers can poll [`ProgressSignal::snapshot`] or await
//! changes through [`ProgressSignal::subscribe`]. Only the latest value
//! matters, so there is no queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;

/// Share of the range driven by decoding the source.
pub const DECODE_SHARE: f64 = 40.0;
/// Share of the range driven by committed batches.
pub const COMMIT_SHARE: f64 = 50.0;
/// Highest value the migration worker publishes on its own. The remainder is
/// reserved for the caller's finalize step.
pub const DRIVER_CEILING: f64 = DECODE_SHARE + COMMIT_SHARE;
/// Value once the caller has finalized.
pub const COMPLETE: f64 = 100.0;

/// Point-in-time view of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub value: f64,
    pub in_progress: bool,
}

/// Atomically published progress value.
///
/// The value is stored as the bit pattern of a non-negative `f64`. For
/// non-negative floats the IEEE-754 bit patterns order the same way as the
/// values, so `fetch_max` on the bits gives a lock-free monotonic maximum.
pub struct ProgressSignal {
    bits: AtomicU64,
    in_progress: AtomicBool,
    tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            in_progress: AtomicBool::new(false),
            tx,
        }
    }

    /// Current progress value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Whether a migration is currently running.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            value: self.value(),
            in_progress: self.in_progress(),
        }
    }

    /// Subscribe to changes. The receiver starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        let rx = self.tx.subscribe();
        self.publish();
        rx
    }

    /// Start a fresh run: value back to 0, in progress.
    pub fn reset(&self) {
        self.bits.store(0f64.to_bits(), Ordering::Release);
        self.in_progress.store(true, Ordering::Release);
        self.publish();
    }

    /// Raise the value to `value` if it is higher than the current one.
    ///
    /// Lower values are ignored, so the published value never decreases
    /// within a run.
    pub fn advance(&self, value: f64) {
        let Some(value) = clamp(value) else {
            return;
        };
        let previous = self.bits.fetch_max(value.to_bits(), Ordering::AcqRel);
        if value.to_bits() > previous {
            self.publish();
        }
    }

    /// Overwrite both value and flag.
    ///
    /// This bypasses monotonicity and is meant for the orchestrating caller:
    /// the 90 -> 100 handoff once downstream consumers are ready, or marking
    /// the run stopped after a failure.
    pub fn force_set(&self, value: f64, in_progress: bool) {
        if let Some(value) = clamp(value) {
            self.bits.store(value.to_bits(), Ordering::Release);
        }
        self.in_progress.store(in_progress, Ordering::Release);
        self.publish();
    }

    /// Leave the value as is and clear the in-progress flag.
    pub fn stop(&self) {
        self.in_progress.store(false, Ordering::Release);
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }
}

impl Default for ProgressSignal {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(value: f64) -> Option<f64> {
    if value.is_nan() {
        return None;
    }
    // -0.0 has the sign bit set and would compare above every positive value
    Some(value.clamp(0.0, COMPLETE) + 0.0)
}

/// Progress for a run that has consumed `decoded` and committed `committed`
/// fractions of the source.
pub fn blended(decoded: f64, committed: f64) -> f64 {
    DECODE_SHARE * decoded.clamp(0.0, 1.0) + COMMIT_SHARE * committed.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_advance_is_monotonic() {
        let signal = ProgressSignal::new();
        signal.reset();
        signal.advance(10.0);
        signal.advance(5.0);
        assert_eq!(signal.value(), 10.0);
        signal.advance(42.5);
        assert_eq!(signal.value(), 42.5);
    }

    #[test]
    fn test_clamps_range() {
        let signal = ProgressSignal::new();
        signal.advance(250.0);
        assert_eq!(signal.value(), 100.0);

        signal.force_set(-3.0, false);
        assert_eq!(signal.value(), 0.0);
        signal.advance(f64::NAN);
        assert_eq!(signal.value(), 0.0);
        signal.advance(1.0);
        assert_eq!(signal.value(), 1.0);
    }

    #[test]
    fn test_negative_zero_does_not_poison() {
        let signal = ProgressSignal::new();
        signal.advance(-0.0);
        signal.advance(3.0);
        assert_eq!(signal.value(), 3.0);
    }

    #[test]
    fn test_reset_and_force_set() {
        let signal = ProgressSignal::new();
        signal.advance(90.0);
        signal.reset();
        assert_eq!(
            signal.snapshot(),
            ProgressSnapshot {
                value: 0.0,
                in_progress: true
            }
        );

        signal.force_set(100.0, false);
        assert_eq!(signal.value(), 100.0);
        assert!(!signal.in_progress());
    }

    #[test]
    fn test_blended_allocation() {
        assert_eq!(blended(0.0, 0.0), 0.0);
        assert_eq!(blended(1.0, 0.0), DECODE_SHARE);
        assert_eq!(blended(1.0, 1.0), DRIVER_CEILING);
        assert_eq!(blended(2.0, 2.0), DRIVER_CEILING);
    }

    #[test]
    fn test_concurrent_readers_see_monotonic_values() {
        let signal = Arc::new(ProgressSignal::new());
        signal.reset();

        let reader = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let mut last = 0.0;
                for _ in 0..10_000 {
                    let value = signal.value();
                    assert!(value >= last, "progress went backwards: {} < {}", value, last);
                    last = value;
                }
            })
        };

        for step in 0..=900 {
            signal.advance(step as f64 / 10.0);
        }
        reader.join().unwrap();
        assert_eq!(signal.value(), 90.0);
    }

    #[tokio::test]
    async fn test_subscribe_sees_latest() {
        let signal = ProgressSignal::new();
        let mut rx = signal.subscribe();
        signal.reset();
        signal.advance(12.0);
        rx.changed().await.unwrap();
        let snapshot = *rx.borrow_and_update();
        assert_eq!(snapshot.value, 12.0);
        assert!(snapshot.in_progress);
    }
}
