//! Deterministic stand-ins for host audio and input.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{Arc, Mutex};

use crate::audio::TickPlayer;

/// Offset applied to injected stray taps, in seconds
const STRAY_TAP_OFFSET_SECONDS: f64 = 0.22;

/// Tick player that records every (index, total) it is asked to play
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTickPlayer {
    ticks: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl RecordingTickPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded ticks
    pub fn ticks(&self) -> Vec<(u32, u32)> {
        self.ticks.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl TickPlayer for RecordingTickPlayer {
    fn play_tick(&mut self, index: u32, total: u32) {
        if let Ok(mut ticks) = self.ticks.lock() {
            ticks.push((index, total));
        }
    }
}

/// Seeded player that taps along with the measurement beats
///
/// Each tap lands at `beat + bias + uniform(-jitter, jitter)`.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    bias_seconds: f64,
    jitter_seconds: f64,
    miss_every: Option<u32>,
    stray_every: Option<u32>,
    rng: StdRng,
}

impl SimulatedPlayer {
    pub fn new(bias_seconds: f64, jitter_seconds: f64, seed: u64) -> Self {
        Self {
            bias_seconds,
            jitter_seconds: jitter_seconds.abs(),
            miss_every: None,
            stray_every: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Skip every `n`th beat (1-based); 0 disables
    pub fn with_miss_every(mut self, n: u32) -> Self {
        self.miss_every = (n > 0).then_some(n);
        self
    }

    /// Push every `n`th tap far off the beat; 0 disables
    pub fn with_stray_every(mut self, n: u32) -> Self {
        self.stray_every = (n > 0).then_some(n);
        self
    }

    /// Generate ascending tap times for `beats` beats starting at `start`
    pub fn tap_times(&mut self, start: f64, interval: f64, beats: u32) -> Vec<f64> {
        let mut taps = Vec::with_capacity(beats as usize);
        for beat in 0..beats {
            let ordinal = beat + 1;
            if self.miss_every.is_some_and(|n| ordinal % n == 0) {
                continue;
            }

            let jitter = if self.jitter_seconds > 0.0 {
                self.rng.gen_range(-self.jitter_seconds..=self.jitter_seconds)
            } else {
                0.0
            };
            let stray = if self.stray_every.is_some_and(|n| ordinal % n == 0) {
                STRAY_TAP_OFFSET_SECONDS
            } else {
                0.0
            };

            taps.push(start + beat as f64 * interval + self.bias_seconds + jitter + stray);
        }
        taps.sort_by(f64::total_cmp);
        taps
    }
}
