// CalibrationSession - orchestrates one tap-offset calibration run
//
// Owns the running measurement (scheduler + tap capture), drives it from the
// injected clock, and reports progress through a broadcast channel of
// CalibrationEvent. Only one run can be in flight per session: starting while
// running is refused, never queued or replaced.
//
// Workflow:
// 1. start_calibration() - count-in begins, first beat fires immediately
// 2. tick() from the host loop - releases due beats, switches to measuring
// 3. register_tap() from the input handler - records samples while measuring
// 4. after the last beat - estimator runs, offset goes to the settings sink

use tokio::sync::broadcast;

use crate::audio::{SilentTick, TickPlayer};
use crate::calibration::estimator::{estimate_offset, CalibrationResult};
use crate::calibration::events::CalibrationEvent;
use crate::calibration::scheduler::{BeatScheduler, SchedulerEvent, SchedulerPhase};
use crate::calibration::tap_capture::{TapCapture, TapSample};
use crate::clock::Clock;
use crate::config::{AppConfig, CalibrationConfig};
use crate::error::{log_calibration_error, CalibrationError};
use crate::settings::{SettingsSink, JUDGEMENT_OFFSET_KEY};

/// Session lifecycle, identical to the scheduler's phases
pub type SessionState = SchedulerPhase;

pub const STATUS_COUNT_IN: &str = "Listen to the beat...";
pub const STATUS_MEASURING: &str = "Tap along with the beat!";
pub const STATUS_NOT_ENOUGH_TAPS: &str = "Not enough taps. Try again.";
pub const STATUS_INCONSISTENT_TAPS: &str = "Taps were too inconsistent. Try again.";

const DEFAULT_EVENT_BUFFER: usize = 128;

/// State that lives only for the duration of one run
struct Measurement {
    scheduler: BeatScheduler,
    capture: TapCapture,
    measurement_start: Option<f64>,
}

/// Calibration orchestrator
pub struct CalibrationSession {
    config: CalibrationConfig,
    clock: Box<dyn Clock>,
    tick_player: Box<dyn TickPlayer>,
    settings: Option<Box<dyn SettingsSink>>,
    events: broadcast::Sender<CalibrationEvent>,
    state: SessionState,
    active: Option<Measurement>,
    last_result: Option<CalibrationResult>,
}

impl CalibrationSession {
    /// Create an idle session
    ///
    /// The configuration is validated when a run starts, not here.
    pub fn new<C: Clock + 'static>(config: CalibrationConfig, clock: C) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_BUFFER);
        Self {
            config,
            clock: Box::new(clock),
            tick_player: Box::new(SilentTick),
            settings: None,
            events,
            state: SessionState::Idle,
            active: None,
            last_result: None,
        }
    }

    /// Create a session from the application config
    pub fn from_app_config<C: Clock + 'static>(config: &AppConfig, clock: C) -> Self {
        Self::new(config.calibration.clone(), clock).with_event_buffer(config.events.buffer_size)
    }

    /// Replace the notification channel with one of `capacity` events
    ///
    /// Existing subscribers stay attached to the old channel.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        self.events = events;
        self
    }

    /// Attach the host's audible tick
    pub fn with_tick_player<T: TickPlayer + 'static>(mut self, player: T) -> Self {
        self.tick_player = Box::new(player);
        self
    }

    /// Attach the settings store that receives the final offset
    pub fn with_settings_sink<S: SettingsSink + 'static>(mut self, sink: S) -> Self {
        self.settings = Some(Box::new(sink));
        self
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CalibrationEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Replace the configuration used by the next run
    ///
    /// # Errors
    /// - `AlreadyInProgress` while a run is active
    /// - `InvalidConfiguration` if the new config breaks the scheduling invariants
    pub fn set_config(&mut self, config: CalibrationConfig) -> Result<(), CalibrationError> {
        if self.is_running() {
            return Err(CalibrationError::AlreadyInProgress);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Result of the most recent successful run
    pub fn last_result(&self) -> Option<CalibrationResult> {
        self.last_result
    }

    /// Samples accepted so far in the current run
    pub fn samples(&self) -> &[TapSample] {
        self.active
            .as_ref()
            .map(|m| m.capture.samples())
            .unwrap_or(&[])
    }

    /// Clock time of the next scheduled beat or phase change
    pub fn next_beat_due(&self) -> Option<f64> {
        self.active.as_ref().and_then(|m| m.scheduler.next_due())
    }

    /// Start a new calibration run
    ///
    /// # Errors
    /// - `AlreadyInProgress` if a run is active; the active run is untouched
    /// - `InvalidConfiguration` if the config breaks the scheduling invariants
    pub fn start_calibration(&mut self) -> Result<(), CalibrationError> {
        if self.is_running() {
            let err = CalibrationError::AlreadyInProgress;
            log_calibration_error(&err, "start_calibration");
            return Err(err);
        }

        self.config.validate().inspect_err(|err| {
            log_calibration_error(err, "start_calibration");
        })?;

        let now = self.clock.now();
        let mut scheduler = BeatScheduler::new();
        scheduler.start(
            now,
            self.config.bpm,
            self.config.count_in_beats,
            self.config.total_beats,
        )?;
        let capture = TapCapture::new(
            scheduler.interval_seconds(),
            self.config.discard_first_beats,
            self.config.total_beats,
        );

        self.active = Some(Measurement {
            scheduler,
            capture,
            measurement_start: None,
        });
        self.state = SessionState::CountIn;
        self.last_result = None;

        log::info!(
            "[CalibrationSession] Started: bpm={}, count_in={}, beats={}, discard={}",
            self.config.bpm,
            self.config.count_in_beats,
            self.config.total_beats,
            self.config.discard_first_beats
        );

        self.publish(CalibrationEvent::StatusChanged {
            message: STATUS_COUNT_IN.to_string(),
        });
        self.tick();
        Ok(())
    }

    /// Cancel the active run without computing a result
    ///
    /// # Returns
    /// `true` if a run was cancelled, `false` if nothing was running
    pub fn cancel_calibration(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }

        if let Some(measurement) = self.active.as_mut() {
            measurement.scheduler.cancel();
        }
        self.tick();
        true
    }

    /// Advance the run to the current clock time
    ///
    /// Call once per host frame or timer tick. Returns the resulting state.
    pub fn tick(&mut self) -> SessionState {
        let now = self.clock.now();
        while let Some(event) = self
            .active
            .as_mut()
            .and_then(|measurement| measurement.scheduler.poll(now))
        {
            self.handle_scheduler_event(event);
        }
        self.state
    }

    /// Register a tap at the current clock time
    ///
    /// The run is first advanced to the clock, so a tap is judged against the
    /// scheduled phase boundaries rather than the last host `tick()`.
    pub fn register_tap(&mut self) -> Option<TapSample> {
        if self.tick() != SessionState::Measuring {
            return None;
        }
        let start = self.active.as_ref()?.measurement_start?;
        let elapsed = self.clock.now() - start;
        self.register_tap_elapsed(elapsed)
    }

    /// Register a tap `elapsed_seconds` after measurement started
    ///
    /// No-op unless measuring. Returns the stored sample, or `None` if the tap
    /// was ignored or fell in the adaptation window.
    pub fn register_tap_elapsed(&mut self, elapsed_seconds: f64) -> Option<TapSample> {
        if self.state != SessionState::Measuring {
            return None;
        }

        let sample = self.active.as_mut()?.capture.record(elapsed_seconds)?;
        log::debug!(
            "[CalibrationSession] Tap on beat {}: {:+.1}ms",
            sample.beat_index,
            sample.raw_offset_seconds * 1000.0
        );
        Some(sample)
    }

    fn handle_scheduler_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Pulse(pulse) => {
                self.tick_player.play_tick(pulse.index, pulse.total);
                self.publish(CalibrationEvent::Beat {
                    index: pulse.index,
                    total: pulse.total,
                });
            }
            SchedulerEvent::MeasurementStarted { at } => {
                if let Some(measurement) = self.active.as_mut() {
                    measurement.measurement_start = Some(at);
                }
                self.state = SessionState::Measuring;
                self.publish(CalibrationEvent::StatusChanged {
                    message: STATUS_MEASURING.to_string(),
                });
            }
            SchedulerEvent::Completed { .. } => {
                self.state = SessionState::Completed;
                self.finish_measurement();
            }
            SchedulerEvent::Cancelled => {
                self.state = SessionState::Cancelled;
                self.active = None;
                log::info!("[CalibrationSession] Cancelled by user");
                self.publish(CalibrationEvent::CalibrationCancelled);
            }
        }
    }

    fn finish_measurement(&mut self) {
        let Some(measurement) = self.active.take() else {
            return;
        };
        let offsets = measurement.capture.offsets();

        match estimate_offset(&offsets) {
            Ok(result) => {
                if let Some(sink) = self.settings.as_mut() {
                    sink.store_offset(JUDGEMENT_OFFSET_KEY, result.final_offset_seconds);
                }
                self.last_result = Some(result);

                log::info!(
                    "[CalibrationSession] Result: {}ms (raw={} taps, filtered={}, seen={})",
                    result.offset_ms(),
                    result.total_tap_count,
                    result.accepted_sample_count,
                    measurement.capture.taps_seen()
                );

                self.publish(CalibrationEvent::StatusChanged {
                    message: format!(
                        "Offset: {}ms ({} taps)",
                        result.offset_ms(),
                        result.accepted_sample_count
                    ),
                });
                self.publish(CalibrationEvent::CalibrationComplete {
                    offset_seconds: result.final_offset_seconds,
                });
            }
            Err(err) => {
                log_calibration_error(&err, "finish_calibration");
                self.state = SessionState::Cancelled;

                let message = match err {
                    CalibrationError::InsufficientSamples { .. } => STATUS_NOT_ENOUGH_TAPS,
                    _ => STATUS_INCONSISTENT_TAPS,
                };
                self.publish(CalibrationEvent::StatusChanged {
                    message: message.to_string(),
                });
                self.publish(CalibrationEvent::CalibrationCancelled);
            }
        }
    }

    fn publish(&self, event: CalibrationEvent) {
        log::debug!("[CalibrationSession] -> {}", event.kind());
        // No subscribers is fine; the UI may not be listening yet
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests;
