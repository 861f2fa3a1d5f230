use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::Receiver;

use super::*;
use crate::clock::ManualClock;
use crate::settings::JudgementOffsetStore;
use crate::testing::RecordingTickPlayer;

const EPS: f64 = 1e-9;

struct Harness {
    clock: ManualClock,
    session: CalibrationSession,
    rx: Receiver<CalibrationEvent>,
    ticks: RecordingTickPlayer,
    store: Arc<Mutex<JudgementOffsetStore>>,
}

/// 120 BPM: count-in beats at 0.0..1.5, measuring 2.0..2.0 + (total-1)*0.5
fn harness(total_beats: u32, discard_first_beats: u32) -> Harness {
    let config = CalibrationConfig {
        bpm: 120.0,
        count_in_beats: 4,
        total_beats,
        discard_first_beats,
    };
    let clock = ManualClock::new();
    let ticks = RecordingTickPlayer::new();
    let store = Arc::new(Mutex::new(JudgementOffsetStore::default()));
    let session = CalibrationSession::new(config, clock.clone())
        .with_tick_player(ticks.clone())
        .with_settings_sink(Arc::clone(&store));
    let rx = session.subscribe();

    Harness {
        clock,
        session,
        rx,
        ticks,
        store,
    }
}

impl Harness {
    fn advance_to(&mut self, seconds: f64) {
        self.clock.set(seconds);
        self.session.tick();
    }

    fn enter_measuring(&mut self) {
        self.session.start_calibration().unwrap();
        self.advance_to(2.0);
        assert_eq!(self.session.state(), SessionState::Measuring);
    }

    fn run_to_end(&mut self) {
        while self.session.is_running() {
            self.clock.advance(0.5);
            self.session.tick();
        }
    }

    fn events(&mut self) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn stored_offset(&self) -> Option<f64> {
        self.store.lock().unwrap().get(JUDGEMENT_OFFSET_KEY)
    }
}

fn status(message: &str) -> CalibrationEvent {
    CalibrationEvent::StatusChanged {
        message: message.to_string(),
    }
}

#[test]
fn test_new_session_is_idle() {
    let mut h = harness(8, 2);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.session.is_running());
    assert!(h.session.last_result().is_none());
    assert!(h.session.next_beat_due().is_none());
    assert_eq!(h.session.tick(), SessionState::Idle);
    assert!(h.events().is_empty());
}

#[test]
fn test_start_emits_status_and_first_beat() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();

    assert_eq!(h.session.state(), SessionState::CountIn);
    assert_eq!(
        h.events(),
        vec![
            status(STATUS_COUNT_IN),
            CalibrationEvent::Beat { index: 1, total: 4 },
        ]
    );
    assert_eq!(h.ticks.ticks(), vec![(1, 4)]);
    assert_eq!(h.session.next_beat_due(), Some(0.5));
}

#[test]
fn test_start_while_running_is_refused() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();
    h.advance_to(1.0);
    h.events();

    let result = h.session.start_calibration();
    assert_eq!(result, Err(CalibrationError::AlreadyInProgress));
    assert_eq!(h.session.state(), SessionState::CountIn);
    assert!(h.events().is_empty());

    // The original run continues on its own schedule
    h.advance_to(1.5);
    assert_eq!(h.events(), vec![CalibrationEvent::Beat { index: 4, total: 4 }]);
}

#[test]
fn test_invalid_config_fails_fast() {
    let clock = ManualClock::new();
    let config = CalibrationConfig {
        bpm: 120.0,
        count_in_beats: 4,
        total_beats: 4,
        discard_first_beats: 4,
    };
    let mut session = CalibrationSession::new(config, clock);
    let mut rx = session.subscribe();

    let err = session.start_calibration().unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidConfiguration { .. }));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_full_beat_sequence_without_taps() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();
    h.run_to_end();

    let beats: Vec<(u32, u32)> = h
        .events()
        .iter()
        .filter_map(|e| match e {
            CalibrationEvent::Beat { index, total } => Some((*index, *total)),
            _ => None,
        })
        .collect();

    let mut expected: Vec<(u32, u32)> = (1..=4).map(|i| (i, 4)).collect();
    expected.extend((1..=8).map(|i| (i, 8)));
    assert_eq!(beats, expected);
    assert_eq!(h.ticks.ticks(), expected);
}

#[test]
fn test_phase_transitions_follow_clock() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();

    h.advance_to(1.99);
    assert_eq!(h.session.state(), SessionState::CountIn);

    h.advance_to(2.0);
    assert_eq!(h.session.state(), SessionState::Measuring);
    let events = h.events();
    assert!(events.contains(&status(STATUS_MEASURING)));
    assert_eq!(
        events.last(),
        Some(&CalibrationEvent::Beat { index: 1, total: 8 })
    );

    // Last measuring beat at 5.5, completion one interval later
    h.advance_to(5.99);
    assert_eq!(h.session.state(), SessionState::Measuring);
    h.advance_to(6.0);
    assert_ne!(h.session.state(), SessionState::Measuring);
}

#[test]
fn test_taps_ignored_outside_measuring() {
    let mut h = harness(8, 0);
    assert!(h.session.register_tap_elapsed(0.5).is_none());
    assert!(h.session.register_tap().is_none());

    h.session.start_calibration().unwrap();
    h.advance_to(1.0);
    assert!(h.session.register_tap_elapsed(0.5).is_none());
    assert!(h.session.register_tap().is_none());
    assert!(h.session.samples().is_empty());
}

#[test]
fn test_register_tap_uses_clock() {
    let mut h = harness(8, 2);
    h.enter_measuring();

    // Beat 5 of measurement is due at 2.0 + 5 * 0.5 = 4.5
    h.advance_to(4.53);
    let sample = h.session.register_tap().unwrap();
    assert_eq!(sample.beat_index, 5);
    assert!((sample.raw_offset_seconds - 0.03).abs() < 1e-6);
    assert_eq!(h.session.samples().len(), 1);
}

#[test]
fn test_tap_before_tick_catches_up_to_measuring() {
    let mut h = harness(8, 0);
    h.session.start_calibration().unwrap();

    // Measurement began at 2.0 but the host has not ticked since start
    h.clock.set(2.51);
    let sample = h.session.register_tap().unwrap();
    assert_eq!(h.session.state(), SessionState::Measuring);
    assert_eq!(sample.beat_index, 1);
    assert!((sample.raw_offset_seconds - 0.01).abs() < 1e-6);
    assert!(h
        .events()
        .contains(&CalibrationEvent::Beat { index: 2, total: 8 }));
}

#[test]
fn test_tap_after_scheduled_end_not_counted() {
    let mut h = harness(8, 0);
    h.enter_measuring();
    for beat in 1..=4 {
        assert!(h.session.register_tap_elapsed(beat as f64 * 0.5).is_some());
    }

    // Completion was due at 6.0; no tick has observed it yet
    h.clock.set(6.2);
    assert!(h.session.register_tap().is_none());
    assert_eq!(h.session.state(), SessionState::Completed);

    let result = h.session.last_result().unwrap();
    assert_eq!(result.total_tap_count, 4);
    assert_eq!(result.final_offset_seconds, 0.0);
}

#[test]
fn test_early_beats_never_sampled() {
    let mut h = harness(8, 2);
    h.enter_measuring();

    assert!(h.session.register_tap_elapsed(0.0).is_none());
    assert!(h.session.register_tap_elapsed(0.2).is_none());
    assert!(h.session.register_tap_elapsed(0.6).is_none());
    assert!(h.session.register_tap_elapsed(0.74).is_none());
    assert!(h.session.register_tap_elapsed(1.0).is_some());

    assert_eq!(h.session.samples().len(), 1);
    assert!(h.session.samples().iter().all(|s| s.beat_index >= 2));
}

#[test]
fn test_tight_cluster_completes_and_stores_offset() {
    let mut h = harness(8, 0);
    h.enter_measuring();

    for (beat, offset) in [(1, 0.01), (2, -0.01), (3, 0.02), (4, 0.01), (5, 0.00)] {
        let elapsed = beat as f64 * 0.5 + offset;
        assert!(h.session.register_tap_elapsed(elapsed).is_some());
    }
    h.events();
    h.run_to_end();

    assert_eq!(h.session.state(), SessionState::Completed);
    let events = h.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[
            status("Offset: 6ms (5 taps)"),
            CalibrationEvent::CalibrationComplete {
                offset_seconds: 0.006
            },
        ]
    );

    let result = h.session.last_result().unwrap();
    assert_eq!(result.accepted_sample_count, 5);
    assert_eq!(result.total_tap_count, 5);
    assert_eq!(h.stored_offset(), Some(0.006));
    assert!(h.session.samples().is_empty());
}

#[test]
fn test_outlier_tap_excluded() {
    let mut h = harness(10, 0);
    h.enter_measuring();

    for beat in 1..=7 {
        h.session.register_tap_elapsed(beat as f64 * 0.5);
    }
    // A stray tap a whole 200ms late
    h.session.register_tap_elapsed(8.0 * 0.5 + 0.2);
    h.run_to_end();

    let result = h.session.last_result().unwrap();
    assert_eq!(result.final_offset_seconds, 0.0);
    assert_eq!(result.accepted_sample_count, 7);
    assert_eq!(result.total_tap_count, 8);
}

#[test]
fn test_all_taps_on_beat() {
    let mut h = harness(12, 2);
    h.enter_measuring();

    for beat in 2..12 {
        assert!(h.session.register_tap_elapsed(beat as f64 * 0.5).is_some());
    }
    h.run_to_end();

    let result = h.session.last_result().unwrap();
    assert_eq!(result.final_offset_seconds, 0.0);
    assert_eq!(result.accepted_sample_count, 10);
    assert!(h
        .events()
        .contains(&CalibrationEvent::CalibrationComplete { offset_seconds: 0.0 }));
}

#[test]
fn test_not_enough_taps_cancels() {
    let mut h = harness(8, 2);
    h.enter_measuring();

    h.session.register_tap_elapsed(1.01);
    h.session.register_tap_elapsed(1.52);
    h.run_to_end();

    assert_eq!(h.session.state(), SessionState::Cancelled);
    let events = h.events();
    assert!(!events
        .iter()
        .any(|e| matches!(e, CalibrationEvent::CalibrationComplete { .. })));
    assert_eq!(
        &events[events.len() - 2..],
        &[
            status(STATUS_NOT_ENOUGH_TAPS),
            CalibrationEvent::CalibrationCancelled
        ]
    );
    assert!(h.session.last_result().is_none());
    assert_eq!(h.stored_offset(), None);
}

#[test]
fn test_cancel_during_count_in() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();
    h.advance_to(0.5);
    h.events();

    assert!(h.session.cancel_calibration());
    assert_eq!(h.session.state(), SessionState::Cancelled);
    assert_eq!(h.events(), vec![CalibrationEvent::CalibrationCancelled]);
    assert!(h.session.samples().is_empty());

    // Nothing else fires, measuring beats never appear
    h.advance_to(20.0);
    assert!(h.events().is_empty());
    assert!(h.ticks.ticks().iter().all(|(_, total)| *total == 4));
    assert!(h.session.register_tap_elapsed(1.0).is_none());

    assert!(!h.session.cancel_calibration());
    assert!(h.events().is_empty());
}

#[test]
fn test_cancel_during_measuring_discards_samples() {
    let mut h = harness(8, 0);
    h.enter_measuring();
    for beat in 1..=4 {
        h.session.register_tap_elapsed(beat as f64 * 0.5 + 0.02);
    }
    h.events();

    assert!(h.session.cancel_calibration());
    assert_eq!(h.events(), vec![CalibrationEvent::CalibrationCancelled]);
    assert!(h.session.samples().is_empty());
    assert!(h.session.last_result().is_none());
    assert_eq!(h.stored_offset(), None);
}

#[test]
fn test_cancel_skips_overdue_beats() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();
    h.events();

    // Host stalled past several due beats before cancelling
    h.clock.set(3.0);
    assert!(h.session.cancel_calibration());
    assert_eq!(h.events(), vec![CalibrationEvent::CalibrationCancelled]);
}

#[test]
fn test_restart_starts_fresh() {
    let mut h = harness(8, 0);
    h.enter_measuring();
    for beat in 1..=5 {
        h.session.register_tap_elapsed(beat as f64 * 0.5 + 0.04);
    }
    h.run_to_end();
    assert_eq!(h.session.last_result().unwrap().offset_ms(), 40);

    // Second run with no taps: previous samples must not leak in
    let restart_at = h.clock.now();
    h.session.start_calibration().unwrap();
    assert_eq!(h.session.state(), SessionState::CountIn);
    assert!(h.session.last_result().is_none());
    assert!(h.session.samples().is_empty());

    h.advance_to(restart_at + 2.0);
    assert_eq!(h.session.state(), SessionState::Measuring);
    h.run_to_end();
    assert_eq!(h.session.state(), SessionState::Cancelled);

    // Settings keep the last successful value
    assert_eq!(h.stored_offset(), Some(0.04));
}

#[test]
fn test_taps_after_completion_ignored() {
    let mut h = harness(8, 0);
    h.enter_measuring();
    for beat in 1..=4 {
        h.session.register_tap_elapsed(beat as f64 * 0.5);
    }
    h.run_to_end();

    assert!(h.session.register_tap_elapsed(2.5).is_none());
    assert!(h.session.register_tap().is_none());
}

#[test]
fn test_set_config_rules() {
    let mut h = harness(8, 2);
    h.session.start_calibration().unwrap();

    let faster = CalibrationConfig {
        bpm: 150.0,
        ..h.session.config().clone()
    };
    assert_eq!(
        h.session.set_config(faster.clone()),
        Err(CalibrationError::AlreadyInProgress)
    );

    h.session.cancel_calibration();
    assert!(h.session.set_config(faster).is_ok());
    assert_eq!(h.session.config().bpm, 150.0);

    let broken = CalibrationConfig {
        bpm: -1.0,
        ..h.session.config().clone()
    };
    assert!(h.session.set_config(broken).is_err());
    assert_eq!(h.session.config().bpm, 150.0);
}

#[test]
fn test_offset_is_whole_milliseconds() {
    let mut h = harness(16, 2);
    h.enter_measuring();
    let jitter = [0.0137, 0.0211, 0.0178, 0.0093, 0.0154, 0.0249, 0.0121, 0.0166];
    for (i, offset) in jitter.iter().enumerate() {
        h.session.register_tap_elapsed((i as f64 + 3.0) * 0.5 + offset);
    }
    h.run_to_end();

    let offset = h.session.last_result().unwrap().final_offset_seconds;
    let ms = offset * 1000.0;
    assert!((ms - ms.round()).abs() < EPS);
}

#[test]
fn test_from_app_config() {
    let app = AppConfig::default();
    let mut session = CalibrationSession::from_app_config(&app, ManualClock::new());
    assert_eq!(session.config(), &app.calibration);
    session.start_calibration().unwrap();
    assert_eq!(session.state(), SessionState::CountIn);
}
