//! `echohand-perception` – Sensor conditioning layer.
//!
//! Turns bursts of noisy flex-sensor millivolt readings into the normalized
//! per-finger curl values the rest of the system trades in.
//!
//! # Modules
//!
//! - [`filter`] – [`NoiseFilter`][filter::NoiseFilter]: reduces one burst of
//!   raw samples to a single value (raw, mean, median or trimmed mean).
//! - [`calibration`] – [`CalibrationSession`][calibration::CalibrationSession]
//!   learns per-finger [`CalibrationRange`][calibration::CalibrationRange]s
//!   from open-hand and closed-hand windows;
//!   [`CurlMapper`][calibration::CurlMapper] remaps filtered values into
//!   `0..=CURL_MAX`; [`TriggerRule`][calibration::TriggerRule] derives the
//!   trigger button from two finger curls.

pub mod calibration;
pub mod filter;

pub use calibration::{
    CalibrationPhase, CalibrationRange, CalibrationSession, CalibrationStrategy, CurlMapper,
    TriggerRule, remap,
};
pub use filter::{DEFAULT_SAMPLE_COUNT, FilterStrategy, NoiseFilter};
