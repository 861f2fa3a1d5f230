//! Configuration management for calibration sessions
//!
//! This module provides runtime configuration loading from JSON files so the
//! tempo, count-in length and discard window can be tuned without
//! recompilation. Missing or malformed files fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::CalibrationError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Beat sequence parameters for one calibration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Metronome tempo in beats per minute
    pub bpm: f64,
    /// Beats played before measurement starts
    pub count_in_beats: u32,
    /// Beats played during measurement
    pub total_beats: u32,
    /// Leading measurement beats whose taps are ignored while the player adapts
    pub discard_first_beats: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            count_in_beats: 4,
            total_beats: 16,
            discard_first_beats: 2,
        }
    }
}

impl CalibrationConfig {
    /// Seconds between consecutive beats (60 / bpm)
    pub fn beat_interval_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Check the scheduling invariants
    ///
    /// # Errors
    /// - `InvalidConfiguration` if bpm is not a positive finite number
    /// - `InvalidConfiguration` if total_beats is zero
    /// - `InvalidConfiguration` if discard_first_beats >= total_beats
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(CalibrationError::InvalidConfiguration {
                reason: format!("bpm must be a positive number (got {})", self.bpm),
            });
        }

        if self.total_beats == 0 {
            return Err(CalibrationError::InvalidConfiguration {
                reason: "total_beats must be greater than 0".to_string(),
            });
        }

        if self.discard_first_beats >= self.total_beats {
            return Err(CalibrationError::InvalidConfiguration {
                reason: format!(
                    "discard_first_beats ({}) must be less than total_beats ({})",
                    self.discard_first_beats, self.total_beats
                ),
            });
        }

        Ok(())
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Capacity of the broadcast channel carrying session events
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 128 }
    }
}

/// Judgement offset setting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Largest magnitude the stored judgement offset may take, in seconds
    pub offset_clamp_seconds: f64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            offset_clamp_seconds: 0.1,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file doesn't exist
    /// or the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/calibration_config.json")
    }
}
