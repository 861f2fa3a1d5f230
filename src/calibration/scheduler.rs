// BeatScheduler - fixed-interval pulse sequence
//
// Drives the count-in and measurement phases of a calibration run as a
// timer-driven step function. The host calls poll() from its main loop with
// the current real time; each call releases at most one due event, so a
// stalled host still observes every pulse in chronological order.
//
// Beat k of a phase is due at phase_start + k * interval. Times are derived
// from the phase start instead of summing intervals, so pacing never drifts.

use crate::error::CalibrationError;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SchedulerPhase {
    Idle,
    CountIn,
    Measuring,
    Completed,
    Cancelled,
}

impl SchedulerPhase {
    /// True while pulses are still being produced
    pub fn is_running(&self) -> bool {
        matches!(self, SchedulerPhase::CountIn | SchedulerPhase::Measuring)
    }
}

/// A single beat released by the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatPulse {
    /// Phase the beat belongs to (CountIn or Measuring)
    pub phase: SchedulerPhase,
    /// 1-based index within the phase
    pub index: u32,
    /// Number of beats in the phase
    pub total: u32,
    /// Clock time the beat was due at
    pub due_at: f64,
}

/// Events released by [`BeatScheduler::poll`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerEvent {
    Pulse(BeatPulse),
    /// Count-in finished; taps are measured relative to `at`
    MeasurementStarted { at: f64 },
    /// One interval after the final measurement beat
    Completed { at: f64 },
    Cancelled,
}

/// Timer-driven beat sequencer
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    phase: SchedulerPhase,
    interval: f64,
    count_in_beats: u32,
    total_beats: u32,
    phase_start: f64,
    pulses_emitted: u32,
    cancel_requested: bool,
}

impl BeatScheduler {
    /// Create an idle scheduler
    pub fn new() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            interval: 0.0,
            count_in_beats: 0,
            total_beats: 0,
            phase_start: 0.0,
            pulses_emitted: 0,
            cancel_requested: false,
        }
    }

    /// Begin a new sequence at clock time `now`
    ///
    /// The first count-in beat is due immediately. With `count_in_beats == 0`
    /// measurement starts at `now`.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if bpm is not positive or total_beats is zero
    pub fn start(
        &mut self,
        now: f64,
        bpm: f64,
        count_in_beats: u32,
        total_beats: u32,
    ) -> Result<(), CalibrationError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(CalibrationError::InvalidConfiguration {
                reason: format!("bpm must be a positive number (got {})", bpm),
            });
        }
        if total_beats == 0 {
            return Err(CalibrationError::InvalidConfiguration {
                reason: "total_beats must be greater than 0".to_string(),
            });
        }

        self.phase = SchedulerPhase::CountIn;
        self.interval = 60.0 / bpm;
        self.count_in_beats = count_in_beats;
        self.total_beats = total_beats;
        self.phase_start = now;
        self.pulses_emitted = 0;
        self.cancel_requested = false;

        log::debug!(
            "[BeatScheduler] Started: interval={:.3}s, count_in={}, total={}",
            self.interval,
            count_in_beats,
            total_beats
        );
        Ok(())
    }

    /// Request cooperative cancellation
    ///
    /// Observed by the next poll(), which releases `Cancelled`.
    pub fn cancel(&mut self) {
        if self.phase.is_running() {
            self.cancel_requested = true;
        }
    }

    /// Release the next due event, if any
    ///
    /// Call repeatedly until it returns `None` to catch up to `now`.
    pub fn poll(&mut self, now: f64) -> Option<SchedulerEvent> {
        if !self.phase.is_running() {
            return None;
        }

        if self.cancel_requested {
            self.phase = SchedulerPhase::Cancelled;
            log::debug!("[BeatScheduler] Cancelled after {} pulses", self.pulses_emitted);
            return Some(SchedulerEvent::Cancelled);
        }

        let beats = self.beats_in_phase();
        if self.pulses_emitted < beats {
            let due_at = self.phase_start + self.pulses_emitted as f64 * self.interval;
            if now < due_at {
                return None;
            }
            self.pulses_emitted += 1;
            return Some(SchedulerEvent::Pulse(BeatPulse {
                phase: self.phase,
                index: self.pulses_emitted,
                total: beats,
                due_at,
            }));
        }

        let phase_end = self.phase_start + beats as f64 * self.interval;
        if now < phase_end {
            return None;
        }

        match self.phase {
            SchedulerPhase::CountIn => {
                self.phase = SchedulerPhase::Measuring;
                self.phase_start = phase_end;
                self.pulses_emitted = 0;
                Some(SchedulerEvent::MeasurementStarted { at: phase_end })
            }
            _ => {
                self.phase = SchedulerPhase::Completed;
                Some(SchedulerEvent::Completed { at: phase_end })
            }
        }
    }

    /// Clock time of the next pending event, `None` once finished
    pub fn next_due(&self) -> Option<f64> {
        if !self.phase.is_running() {
            return None;
        }
        Some(self.phase_start + self.pulses_emitted as f64 * self.interval)
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval
    }

    /// Start of the measurement phase once it has begun
    pub fn measurement_start(&self) -> Option<f64> {
        match self.phase {
            SchedulerPhase::Measuring | SchedulerPhase::Completed => Some(self.phase_start),
            _ => None,
        }
    }

    fn beats_in_phase(&self) -> u32 {
        match self.phase {
            SchedulerPhase::CountIn => self.count_in_beats,
            _ => self.total_beats,
        }
    }
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new()
    }
}
