//! Notification events published by a calibration session.
//!
//! These are the only things a presentation layer observes; each variant maps
//! to one UI notification.

use serde::{Deserialize, Serialize};

/// Session notifications, serialized as `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CalibrationEvent {
    /// A beat fired; `index` is 1-based within the current phase
    Beat { index: u32, total: u32 },
    /// Human-readable status line for the UI
    StatusChanged { message: String },
    /// Measurement finished with a usable offset
    CalibrationComplete { offset_seconds: f64 },
    /// User cancelled, or too few usable taps
    CalibrationCancelled,
}

impl CalibrationEvent {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            CalibrationEvent::Beat { .. } => "beat",
            CalibrationEvent::StatusChanged { .. } => "status_changed",
            CalibrationEvent::CalibrationComplete { .. } => "calibration_complete",
            CalibrationEvent::CalibrationCancelled => "calibration_cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CalibrationEvent::CalibrationComplete { .. } | CalibrationEvent::CalibrationCancelled
        )
    }
}
