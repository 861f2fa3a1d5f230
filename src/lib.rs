// Tap Calibration Core - beat/tap latency calibration engine
// Measures the offset between an audible beat and the player's taps

// Module declarations
pub mod audio;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod settings;
// Seeded player harness; also backs the CLI `simulate` command, so not test-only
pub mod testing;

// Re-exports for convenience
pub use calibration::{
    estimate_offset, CalibrationEvent, CalibrationResult, CalibrationSession, SessionState,
    TapSample,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{AppConfig, CalibrationConfig};
pub use error::{CalibrationError, ErrorCode};
pub use settings::{JudgementOffsetStore, SettingsSink, JUDGEMENT_OFFSET_KEY};
