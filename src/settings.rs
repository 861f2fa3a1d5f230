// Settings sink - receives the calibrated judgement offset
//
// Persistence is the host's concern. The session only forwards the final
// offset under a named numeric key. JudgementOffsetStore is an in-memory sink
// that applies the same clamp and rounding the judgement system expects, so
// hosts without their own store (and tests) can use it directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::calibration::estimator::round_to_ms;

/// Setting key under which the calibrated offset is stored
pub const JUDGEMENT_OFFSET_KEY: &str = "JudgementOffset";

/// Default clamp for the judgement offset (±100 ms)
pub const DEFAULT_OFFSET_CLAMP_SECONDS: f64 = 0.1;

/// Destination for numeric settings produced by calibration
pub trait SettingsSink {
    /// Store `seconds` under `key`
    fn store_offset(&mut self, key: &str, seconds: f64);
}

/// Shared handle so the host can read back what the session stored
impl<S: SettingsSink> SettingsSink for Arc<Mutex<S>> {
    fn store_offset(&mut self, key: &str, seconds: f64) {
        match self.lock() {
            Ok(mut sink) => sink.store_offset(key, seconds),
            Err(_) => log::error!("[Settings] Sink lock poisoned; dropping {}", key),
        }
    }
}

/// In-memory numeric settings with judgement-offset clamping
#[derive(Debug, Clone)]
pub struct JudgementOffsetStore {
    values: HashMap<String, f64>,
    clamp_seconds: f64,
}

impl JudgementOffsetStore {
    pub fn new(clamp_seconds: f64) -> Self {
        Self {
            values: HashMap::new(),
            clamp_seconds: clamp_seconds.abs(),
        }
    }

    /// Current judgement offset, 0.0 until calibrated
    pub fn judgement_offset(&self) -> f64 {
        self.get(JUDGEMENT_OFFSET_KEY).unwrap_or(0.0)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Reset the judgement offset to its default
    pub fn reset(&mut self) {
        self.values.remove(JUDGEMENT_OFFSET_KEY);
    }
}

impl Default for JudgementOffsetStore {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSET_CLAMP_SECONDS)
    }
}

impl SettingsSink for JudgementOffsetStore {
    fn store_offset(&mut self, key: &str, seconds: f64) {
        if !seconds.is_finite() {
            log::warn!("[Settings] Ignoring non-finite value for {}", key);
            return;
        }

        let value = if key == JUDGEMENT_OFFSET_KEY {
            round_to_ms(seconds.clamp(-self.clamp_seconds, self.clamp_seconds))
        } else {
            seconds
        };

        log::info!("[Settings] {} = {:.3}s", key, value);
        self.values.insert(key.to_string(), value);
    }
}
