//! Calibration ranges, curl remapping and the derived trigger.
//!
//! A [`CalibrationRange`] holds the raw millivolt bounds of one flex sensor:
//! `max` is what the sensor reads with the hand fully open, `min` with the
//! hand fully closed. Either may be numerically larger; the remap is a plain
//! affine map and does not care about ordering.
//!
//! ```text
//! mapped = clamp((raw − min) × out_max / (max − min), 0, out_max)
//! curl   = invert ? out_max − mapped : mapped
//! ```
//!
//! # Example
//!
//! ```rust
//! use echohand_perception::calibration::{
//!     CalibrationPhase, CalibrationSession, CalibrationStrategy, CurlMapper,
//! };
//! use echohand_types::Finger;
//!
//! let mut session = CalibrationSession::new(CalibrationStrategy::CumulativeAverage);
//! session.record(CalibrationPhase::OpenHand, [1200; 5]);
//! session.record(CalibrationPhase::ClosedHand, [500; 5]);
//! let ranges = session.finish().expect("both phases sampled");
//!
//! let mapper = CurlMapper::new(ranges);
//! assert_eq!(mapper.curl(Finger::Index, 1200.0), 0);    // open
//! assert_eq!(mapper.curl(Finger::Index, 500.0), 4095);  // closed
//! ```

use echohand_types::{CURL_MAX, FINGER_COUNT, Finger};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Ranges and remap
// ────────────────────────────────────────────────────────────────────────────

/// Learned raw bounds for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRange {
    /// Closed-hand reading.
    pub min: i32,
    /// Open-hand reading.
    pub max: i32,
}

impl CalibrationRange {
    /// Fixed circuit estimate used when calibration is skipped.
    pub const FACTORY: CalibrationRange = CalibrationRange { min: 400, max: 1250 };

    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// `true` when both bounds are equal and no mapping is possible.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// See [`remap`].
    pub fn remap(&self, raw: f64, out_max: i32, invert: bool) -> i32 {
        remap(raw, *self, out_max, invert)
    }
}

impl Default for CalibrationRange {
    fn default() -> Self {
        Self::FACTORY
    }
}

/// Map `raw` from `range` onto `0..=out_max`, clamping out-of-range input.
///
/// A degenerate range returns `out_max / 2` whatever `invert` says.
/// Fractional results truncate toward zero.
pub fn remap(raw: f64, range: CalibrationRange, out_max: i32, invert: bool) -> i32 {
    if range.is_degenerate() {
        return out_max / 2;
    }
    let span = f64::from(range.max) - f64::from(range.min);
    let mapped = (raw - f64::from(range.min)) * f64::from(out_max) / span;
    let clamped = mapped.clamp(0.0, f64::from(out_max)) as i32;
    if invert { out_max - clamped } else { clamped }
}

// ────────────────────────────────────────────────────────────────────────────
// Calibration session
// ────────────────────────────────────────────────────────────────────────────

/// How a calibration window turns its samples into one bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    /// Mean of every sample in the window.
    #[default]
    CumulativeAverage,
    /// Running maximum (open hand) or running minimum (closed hand).
    ObservedExtremes,
}

/// The two calibration windows, in the order the wearer performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// Hand stretched fully open; yields [`CalibrationRange::max`].
    OpenHand,
    /// Fist clenched; yields [`CalibrationRange::min`].
    ClosedHand,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: i64,
    count: u64,
    low: i32,
    high: i32,
}

impl Accumulator {
    fn push(&mut self, sample: i32) {
        if self.count == 0 {
            self.low = sample;
            self.high = sample;
        } else {
            self.low = self.low.min(sample);
            self.high = self.high.max(sample);
        }
        self.sum += i64::from(sample);
        self.count += 1;
    }

    fn mean(&self) -> Option<i32> {
        (self.count > 0).then(|| (self.sum / self.count as i64) as i32)
    }
}

/// Collects samples for both windows and produces one range per finger.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    strategy: CalibrationStrategy,
    open: [Accumulator; FINGER_COUNT],
    closed: [Accumulator; FINGER_COUNT],
}

impl CalibrationSession {
    pub fn new(strategy: CalibrationStrategy) -> Self {
        Self {
            strategy,
            open: [Accumulator::default(); FINGER_COUNT],
            closed: [Accumulator::default(); FINGER_COUNT],
        }
    }

    pub fn strategy(&self) -> CalibrationStrategy {
        self.strategy
    }

    /// Add one reading per finger to `phase`.
    pub fn record(&mut self, phase: CalibrationPhase, samples: [i32; FINGER_COUNT]) {
        let window = match phase {
            CalibrationPhase::OpenHand => &mut self.open,
            CalibrationPhase::ClosedHand => &mut self.closed,
        };
        for (acc, sample) in window.iter_mut().zip(samples) {
            acc.push(sample);
        }
    }

    /// Readings recorded so far for `phase`.
    pub fn sample_count(&self, phase: CalibrationPhase) -> u64 {
        match phase {
            CalibrationPhase::OpenHand => self.open[0].count,
            CalibrationPhase::ClosedHand => self.closed[0].count,
        }
    }

    /// Range learned for one finger, or `None` while a window is empty.
    pub fn range(&self, finger: Finger) -> Option<CalibrationRange> {
        let open = &self.open[finger.index()];
        let closed = &self.closed[finger.index()];
        let (max, min) = match self.strategy {
            CalibrationStrategy::CumulativeAverage => (open.mean()?, closed.mean()?),
            CalibrationStrategy::ObservedExtremes => {
                if open.count == 0 || closed.count == 0 {
                    return None;
                }
                (open.high, closed.low)
            }
        };
        Some(CalibrationRange { min, max })
    }

    /// All five ranges, or `None` while either window is empty.
    pub fn finish(&self) -> Option<[CalibrationRange; FINGER_COUNT]> {
        let mut ranges = [CalibrationRange::FACTORY; FINGER_COUNT];
        for finger in Finger::ALL {
            ranges[finger.index()] = self.range(finger)?;
        }
        debug!(strategy = ?self.strategy, ?ranges, "calibration finished");
        Some(ranges)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Curl mapper and trigger
// ────────────────────────────────────────────────────────────────────────────

/// Per-finger remap configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurlMapper {
    pub ranges: [CalibrationRange; FINGER_COUNT],
    pub out_max: i32,
    /// Report `out_max − mapped` so an open hand reads 0.
    pub invert: bool,
}

impl Default for CurlMapper {
    fn default() -> Self {
        Self::new([CalibrationRange::FACTORY; FINGER_COUNT])
    }
}

impl CurlMapper {
    /// Mapper over `ranges` with the full curl scale and inversion on.
    pub fn new(ranges: [CalibrationRange; FINGER_COUNT]) -> Self {
        Self {
            ranges,
            out_max: CURL_MAX,
            invert: true,
        }
    }

    pub fn curl(&self, finger: Finger, raw: f64) -> i32 {
        self.ranges[finger.index()].remap(raw, self.out_max, self.invert)
    }

    pub fn curls(&self, raw: [f64; FINGER_COUNT]) -> [i32; FINGER_COUNT] {
        Finger::ALL.map(|finger| self.curl(finger, raw[finger.index()]))
    }
}

/// Derived trigger: pressed when two designated fingers both curl past a
/// fraction of full scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub first: Finger,
    pub second: Finger,
    /// Threshold as a fraction of `out_max`; the curl must strictly exceed it.
    pub fraction: f64,
}

impl Default for TriggerRule {
    fn default() -> Self {
        Self {
            first: Finger::Thumb,
            second: Finger::Index,
            fraction: 150.0 / f64::from(CURL_MAX),
        }
    }
}

impl TriggerRule {
    /// Threshold in curl units, rounded to the nearest integer.
    pub fn threshold(&self, out_max: i32) -> i32 {
        (self.fraction * f64::from(out_max)).round() as i32
    }

    pub fn is_pressed(&self, curls: &[i32; FINGER_COUNT], out_max: i32) -> bool {
        let threshold = self.threshold(out_max);
        curls[self.first.index()] > threshold && curls[self.second.index()] > threshold
    }
}
