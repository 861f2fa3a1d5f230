// TapCapture - quantizes taps against the measurement beat grid
//
// A tap is reduced to the nearest measurement beat and its signed distance
// from that beat (positive = late, negative = early). Taps aligned with the
// first `discard_first_beats` beats are dropped while the player adapts to
// the tempo.

/// Taps per beat the sample buffer is sized for up front
const TAPS_PER_BEAT_RESERVED: usize = 2;

/// One accepted tap
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TapSample {
    /// Seconds since measurement started
    pub elapsed_seconds: f64,
    /// round(elapsed / interval)
    pub beat_index: u32,
    /// elapsed - beat_index * interval
    pub raw_offset_seconds: f64,
}

/// Quantize a tap time against a beat grid of `interval` seconds
///
/// Returns `None` for negative or non-finite input.
pub fn quantize_tap(elapsed_seconds: f64, interval: f64) -> Option<TapSample> {
    if !elapsed_seconds.is_finite() || elapsed_seconds < 0.0 {
        return None;
    }

    let beat = (elapsed_seconds / interval).round();
    let nearest_beat_time = beat * interval;

    Some(TapSample {
        elapsed_seconds,
        beat_index: beat as u32,
        raw_offset_seconds: elapsed_seconds - nearest_beat_time,
    })
}

/// Sample collector for one measurement phase
#[derive(Debug, Clone)]
pub struct TapCapture {
    interval: f64,
    discard_first_beats: u32,
    samples: Vec<TapSample>,
    taps_seen: usize,
}

impl TapCapture {
    /// Create a collector
    ///
    /// # Arguments
    /// * `interval` - Seconds between beats
    /// * `discard_first_beats` - Leading beats whose taps are ignored
    /// * `expected_beats` - Capacity hint; room is reserved for two taps per
    ///   beat, beyond that `record` is amortized O(1)
    pub fn new(interval: f64, discard_first_beats: u32, expected_beats: u32) -> Self {
        Self {
            interval,
            discard_first_beats,
            samples: Vec::with_capacity(expected_beats as usize * TAPS_PER_BEAT_RESERVED + 1),
            taps_seen: 0,
        }
    }

    /// Record a tap `elapsed_seconds` after measurement started
    ///
    /// # Returns
    /// * `Some(TapSample)` - Tap was stored
    /// * `None` - Tap fell in the adaptation window or was malformed
    pub fn record(&mut self, elapsed_seconds: f64) -> Option<TapSample> {
        self.taps_seen += 1;

        let sample = quantize_tap(elapsed_seconds, self.interval)?;
        if sample.beat_index < self.discard_first_beats {
            log::debug!(
                "[TapCapture] Discarded tap on beat {} (adaptation window {})",
                sample.beat_index,
                self.discard_first_beats
            );
            return None;
        }

        self.samples.push(sample);
        Some(sample)
    }

    pub fn samples(&self) -> &[TapSample] {
        &self.samples
    }

    /// Raw offsets of stored samples, in tap order
    pub fn offsets(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.raw_offset_seconds).collect()
    }

    /// Stored sample count
    pub fn accepted(&self) -> usize {
        self.samples.len()
    }

    /// Every tap seen, including discarded ones
    pub fn taps_seen(&self) -> usize {
        self.taps_seen
    }
}
