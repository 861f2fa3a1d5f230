// Calibration module - tap-offset calibration workflow
//
// This module provides the pieces of one calibration run:
// 1. BeatScheduler: count-in and measurement beats paced by real time
// 2. TapCapture: quantizes taps against the measurement beat grid
// 3. estimator: IQR-filtered mean of the tap offsets
// 4. CalibrationSession: ties them together and publishes CalibrationEvent
//
// The calibration workflow:
// 1. Create CalibrationSession with a clock (plus tick player / settings sink)
// 2. start_calibration(), then tick() from the host loop
// 3. register_tap() from the input handler while measuring
// 4. Observe CalibrationComplete or CalibrationCancelled on the event channel

pub mod estimator;
pub mod events;
pub mod scheduler;
pub mod session;
pub mod tap_capture;

pub use estimator::{estimate_offset, CalibrationResult, OffsetStatistics};
pub use events::CalibrationEvent;
pub use scheduler::{BeatPulse, BeatScheduler, SchedulerEvent, SchedulerPhase};
pub use session::{CalibrationSession, SessionState};
pub use tap_capture::{TapCapture, TapSample};
