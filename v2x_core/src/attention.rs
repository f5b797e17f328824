//! Driver attention input.
//!
//! An external detector (camera, wearable, test harness) owns the writing
//! side; the agent reads the value once per tick. No lock is ever held
//! across decision logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Single-writer/single-reader "driver impaired" flag.
///
/// Starts `false`: a detector that never reports leaves the driver
/// unimpaired.
#[derive(Debug, Clone, Default)]
pub struct AttentionSignal(Arc<AtomicBool>);

impl AttentionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, impaired: bool) {
        self.0.store(impaired, Ordering::Release);
    }

    pub fn is_impaired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Debounces raw "face visible" observations into the attention signal.
///
/// The driver counts as impaired once the face has been missing for longer
/// than the threshold; a single sighting clears it.
#[derive(Debug)]
pub struct AttentionDebouncer {
    signal: AttentionSignal,
    threshold: Duration,
    absent_since: Option<Duration>,
}

impl AttentionDebouncer {
    pub fn new(signal: AttentionSignal, threshold: Duration) -> Self {
        Self {
            signal,
            threshold,
            absent_since: None,
        }
    }

    /// Feeds one detector frame taken at `now` and returns the published value.
    pub fn observe(&mut self, face_present: bool, now: Duration) -> bool {
        if face_present {
            self.absent_since = None;
            self.signal.set(false);
            return false;
        }

        match self.absent_since {
            None => self.absent_since = Some(now),
            Some(since) if now.saturating_sub(since) > self.threshold => self.signal.set(true),
            Some(_) => {}
        }
        self.signal.is_impaired()
    }

    pub fn signal(&self) -> &AttentionSignal {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_signal_defaults_to_attentive() {
        let signal = AttentionSignal::new();
        assert!(!signal.is_impaired());

        let reader = signal.clone();
        signal.set(true);
        assert!(reader.is_impaired());
    }

    #[test]
    fn test_debouncer_requires_sustained_absence() {
        let signal = AttentionSignal::new();
        let mut debouncer = AttentionDebouncer::new(signal.clone(), Duration::from_secs(2));

        assert!(!debouncer.observe(false, ms(0)));
        assert!(!debouncer.observe(false, ms(1_000)));
        assert!(!debouncer.observe(false, ms(2_000)));
        assert!(debouncer.observe(false, ms(2_050)));
        assert!(signal.is_impaired());
    }

    #[test]
    fn test_debouncer_clears_on_sighting() {
        let signal = AttentionSignal::new();
        let mut debouncer = AttentionDebouncer::new(signal.clone(), Duration::from_secs(2));
        debouncer.observe(false, ms(0));
        debouncer.observe(false, ms(3_000));
        assert!(signal.is_impaired());

        assert!(!debouncer.observe(true, ms(3_050)));
        assert!(!signal.is_impaired());

        // The absence timer restarts from scratch
        assert!(!debouncer.observe(false, ms(3_100)));
        assert!(!debouncer.observe(false, ms(4_000)));
    }

    #[test]
    fn test_written_from_detector_thread() {
        let signal = AttentionSignal::new();
        let writer = signal.clone();
        std::thread::spawn(move || writer.set(true)).join().unwrap();
        assert!(signal.is_impaired());
    }
}
