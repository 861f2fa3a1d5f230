// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Single source of truth for the numeric codes reported to host layers.
///
/// Error code range: 2001-2004
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Fewer accepted taps than the estimator needs
    pub const INSUFFICIENT_SAMPLES: i32 = 2001;

    /// Every tap fell outside the IQR acceptance bounds
    pub const ALL_SAMPLES_REJECTED: i32 = 2002;

    /// Session parameters violate the scheduling invariants
    pub const INVALID_CONFIGURATION: i32 = 2003;

    /// Calibration already in progress
    pub const ALREADY_IN_PROGRESS: i32 = 2004;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// None of these are fatal. The session resolves estimator failures into a
/// status message plus a cancellation event, and start-time failures leave
/// any running session untouched.
///
/// Error code ranges: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Fewer accepted taps than the estimator requires
    InsufficientSamples { required: usize, collected: usize },

    /// The IQR filter excluded every sample
    AllSamplesRejected { total: usize },

    /// Non-positive BPM, zero beats, or a discard window covering every beat
    InvalidConfiguration { reason: String },

    /// Calibration already in progress
    AlreadyInProgress,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientSamples { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_SAMPLES
            }
            CalibrationError::AllSamplesRejected { .. } => {
                CalibrationErrorCodes::ALL_SAMPLES_REJECTED
            }
            CalibrationError::InvalidConfiguration { .. } => {
                CalibrationErrorCodes::INVALID_CONFIGURATION
            }
            CalibrationError::AlreadyInProgress => CalibrationErrorCodes::ALREADY_IN_PROGRESS,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InsufficientSamples {
                required,
                collected,
            } => {
                format!("Insufficient samples: need {}, got {}", required, collected)
            }
            CalibrationError::AllSamplesRejected { total } => {
                format!("All {} samples rejected as outliers", total)
            }
            CalibrationError::InvalidConfiguration { reason } => {
                format!("Invalid configuration: {}", reason)
            }
            CalibrationError::AlreadyInProgress => "Calibration already in progress".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
