//! Deterministic end-to-end calibration runs on a manual clock.

use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use crate::calibration::{CalibrationEvent, CalibrationResult, CalibrationSession, SessionState};
use crate::clock::{Clock, ManualClock};
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::testing::player::SimulatedPlayer;

/// Everything observed during one simulated run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub events: Vec<CalibrationEvent>,
    pub result: Option<CalibrationResult>,
    pub final_state: SessionState,
    pub taps_sent: usize,
}

impl SimulationReport {
    /// Offset carried by the completion event, if the run completed
    pub fn completed_offset(&self) -> Option<f64> {
        self.events.iter().find_map(|event| match event {
            CalibrationEvent::CalibrationComplete { offset_seconds } => Some(*offset_seconds),
            _ => None,
        })
    }

    pub fn was_cancelled(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, CalibrationEvent::CalibrationCancelled))
    }
}

/// Run a full session with `player` tapping along
///
/// The clock jumps straight from one beat or tap to the next, so the run
/// takes no wall-clock time.
///
/// # Errors
/// - `InvalidConfiguration` if `config` breaks the scheduling invariants
pub fn run_simulation(
    config: &CalibrationConfig,
    player: &mut SimulatedPlayer,
) -> Result<SimulationReport, CalibrationError> {
    config.validate()?;

    let clock = ManualClock::new();
    let buffer = (config.count_in_beats + config.total_beats) as usize + 16;
    let mut session =
        CalibrationSession::new(config.clone(), clock.clone()).with_event_buffer(buffer);
    let mut rx = session.subscribe();

    session.start_calibration()?;

    let interval = config.beat_interval_seconds();
    let measurement_start = config.count_in_beats as f64 * interval;
    let taps = player.tap_times(measurement_start, interval, config.total_beats);
    let taps_sent = taps.len();
    let mut pending = taps.into_iter().peekable();
    let mut events = Vec::new();

    while session.is_running() {
        let next = match (session.next_beat_due(), pending.peek().copied()) {
            (Some(beat), Some(tap)) => beat.min(tap),
            (Some(beat), None) => beat,
            (None, Some(tap)) => tap,
            (None, None) => break,
        };
        clock.set(next);
        session.tick();

        while let Some(&tap) = pending.peek() {
            if tap > clock.now() {
                break;
            }
            pending.next();
            session.register_tap();
        }
        drain_events(&mut rx, &mut events);
    }
    drain_events(&mut rx, &mut events);

    Ok(SimulationReport {
        events,
        result: session.last_result(),
        final_state: session.state(),
        taps_sent,
    })
}

fn drain_events(rx: &mut Receiver<CalibrationEvent>, events: &mut Vec<CalibrationEvent>) {
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                log::warn!("[Simulation] Event receiver lagged by {}", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
