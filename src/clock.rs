//! Real-time clock abstraction
//!
//! Calibration pacing must follow wall-clock time, never a scaled or paused
//! game clock. The session only ever asks a [`Clock`] for "seconds since some
//! fixed origin", so hosts supply a monotonic clock and tests supply a
//! [`ManualClock`] they advance by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source in seconds
pub trait Clock {
    /// Seconds elapsed since this clock's origin. Never decreases.
    fn now(&self) -> f64;
}

/// Clock backed by `std::time::Instant`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for deterministic tests and simulation
///
/// Clones share the same time value, so a test can keep one handle while the
/// session owns another. The value is stored as raw `f64` bits, so `set(t)`
/// makes `now()` return exactly `t`.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward. Negative or non-finite steps are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.set(self.now() + seconds);
        }
    }

    /// Jump to an absolute time; earlier times are clamped to the current one
    pub fn set(&self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let _ = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (seconds > f64::from_bits(current)).then(|| seconds.to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
