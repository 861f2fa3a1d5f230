//! Offset estimator - robust averaging of tap offsets
//!
//! Reduces a list of raw tap offsets to one judgement offset:
//! - Quartiles via linear-interpolated rank
//! - Tukey fences at 1.5 x IQR to drop stray taps
//! - Mean of the survivors, rounded to whole milliseconds
//!
//! All functions are pure; the session decides what to do with failures.

use crate::error::CalibrationError;

/// Minimum number of samples needed for an estimate
pub const MIN_SAMPLES: usize = 3;

/// Tukey fence multiplier applied to the IQR
const IQR_FENCE: f64 = 1.5;

/// Final calibration outcome
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationResult {
    /// Mean offset of accepted samples, rounded to 1 ms
    pub final_offset_seconds: f64,
    /// Samples inside the IQR fences
    pub accepted_sample_count: usize,
    /// Samples given to the estimator
    pub total_tap_count: usize,
}

impl CalibrationResult {
    /// Final offset in whole milliseconds
    pub fn offset_ms(&self) -> i64 {
        (self.final_offset_seconds * 1000.0).round() as i64
    }
}

/// Spread statistics computed on the way to an estimate
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OffsetStatistics {
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl OffsetStatistics {
    /// Whether `offset` lies inside the inclusive acceptance bounds
    pub fn accepts(&self, offset: f64) -> bool {
        offset >= self.lower_bound && offset <= self.upper_bound
    }
}

/// Median of an ascending slice
///
/// Even lengths average the two central values. Returns 0.0 for an empty slice.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Percentile of an ascending slice using linear-interpolated rank
///
/// `index = (p / 100) * (n - 1)`, interpolated between the floor and ceil
/// positions. Returns 0.0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let index = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    // lower + (upper - lower) * frac stays exact when both ends are equal
    let frac = index - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Round seconds to the nearest millisecond
pub fn round_to_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Compute median, quartiles and IQR fences for a set of offsets
///
/// Input order does not matter.
pub fn summarize(offsets: &[f64]) -> OffsetStatistics {
    let mut sorted = offsets.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;

    OffsetStatistics {
        median: median(&sorted),
        q1,
        q3,
        iqr,
        lower_bound: q1 - IQR_FENCE * iqr,
        upper_bound: q3 + IQR_FENCE * iqr,
    }
}

/// Estimate the judgement offset from raw tap offsets
///
/// # Errors
/// - `InvalidConfiguration` if any offset is NaN or infinite
/// - `InsufficientSamples` with fewer than [`MIN_SAMPLES`] offsets
/// - `AllSamplesRejected` when no offset survives the IQR fences
pub fn estimate_offset(offsets: &[f64]) -> Result<CalibrationResult, CalibrationError> {
    if let Some(bad) = offsets.iter().find(|o| !o.is_finite()) {
        return Err(CalibrationError::InvalidConfiguration {
            reason: format!("tap offsets must be finite (got {})", bad),
        });
    }

    if offsets.len() < MIN_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            required: MIN_SAMPLES,
            collected: offsets.len(),
        });
    }

    let stats = summarize(offsets);
    let accepted: Vec<f64> = offsets
        .iter()
        .copied()
        .filter(|o| stats.accepts(*o))
        .collect();

    log::debug!(
        "[OffsetEstimator] median={:.4}s q1={:.4}s q3={:.4}s bounds=[{:.4}, {:.4}] accepted={}/{}",
        stats.median,
        stats.q1,
        stats.q3,
        stats.lower_bound,
        stats.upper_bound,
        accepted.len(),
        offsets.len()
    );

    if accepted.is_empty() {
        return Err(CalibrationError::AllSamplesRejected {
            total: offsets.len(),
        });
    }

    let mean = accepted.iter().sum::<f64>() / accepted.len() as f64;

    Ok(CalibrationResult {
        final_offset_seconds: round_to_ms(mean),
        accepted_sample_count: accepted.len(),
        total_tap_count: offsets.len(),
    })
}
