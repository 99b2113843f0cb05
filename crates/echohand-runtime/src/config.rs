//! Deployment configuration for one glove.
//!
//! Filter, calibration method, debug printing and the active link are all
//! chosen here at startup, so one binary serves every glove variant. All
//! sections default to the reference hardware's settings and every field may
//! be omitted from a config file.
//!
//! # Example
//!
//! ```rust
//! use echohand_runtime::config::{GloveConfig, WireFormat};
//!
//! let cfg: GloveConfig = toml::from_str(
//!     r#"
//!     [link]
//!     wire = "binary"
//!
//!     [timing]
//!     sampler_ms = 10
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(cfg.link.wire, WireFormat::Binary);
//! assert_eq!(cfg.timing.relay_ms, 25);
//! ```

use std::time::Duration;

use echohand_middleware::SerialSettings;
use echohand_perception::{CalibrationStrategy, NoiseFilter, TriggerRule};
use echohand_protocol::ascii::DEFAULT_SPLAY;
use echohand_types::{ButtonPolarity, EchoError, FINGER_COUNT};
use serde::{Deserialize, Serialize};

/// Largest accepted `sampler.joystick_scale`.
pub const MAX_JOYSTICK_SCALE: i32 = u16::MAX as i32;

use crate::debug_print::DebugStyle;

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Sensor sampling and normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub filter: NoiseFilter,
    /// What level of the joystick click input means "pressed".
    pub joystick_polarity: ButtonPolarity,
    pub trigger: TriggerRule,
    /// Report an open hand as 0 and a fist as full scale.
    pub invert_curl: bool,
    /// Upper bound of the published joystick axes; raw ADC counts
    /// `0..=4095` are scaled onto `0..=joystick_scale`.
    pub joystick_scale: i32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            filter: NoiseFilter::default(),
            joystick_polarity: ButtonPolarity::default(),
            trigger: TriggerRule::default(),
            invert_curl: true,
            joystick_scale: 1024,
        }
    }
}

/// Open/closed hand calibration at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// When off the factory range is used for every finger.
    pub enabled: bool,
    pub strategy: CalibrationStrategy,
    /// Length of each of the two windows.
    pub window_ms: u64,
    /// Pause between samples inside a window.
    pub sample_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CalibrationStrategy::default(),
            window_ms: 5_000,
            sample_interval_ms: 10,
        }
    }
}

impl CalibrationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Encoding used on the host link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// OpenGloves-style letter lines.
    #[default]
    Ascii,
    /// Sentinel-wrapped packed structs.
    Binary,
}

/// Which physical link the device daemon opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Serve one host over TCP.
    #[default]
    Tcp,
    Serial,
}

/// Host link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub kind: LinkKind,
    pub wire: WireFormat,
    /// Listen address for [`LinkKind::Tcp`].
    pub tcp_addr: String,
    pub serial: SerialSettings,
    /// Splay values announced once when the link comes up.
    pub splay: [i32; FINGER_COUNT],
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: LinkKind::default(),
            wire: WireFormat::default(),
            tcp_addr: "127.0.0.1:7070".to_string(),
            serial: SerialSettings::default(),
            splay: DEFAULT_SPLAY,
        }
    }
}

/// Human-readable state dump. While enabled the host link is silent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub style: DebugStyle,
}

/// Worker periods in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sampler_ms: u64,
    pub relay_ms: u64,
    pub actuator_ms: u64,
    pub printer_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sampler_ms: 30,
            relay_ms: 25,
            actuator_ms: 5,
            printer_ms: 20,
        }
    }
}

impl TimingConfig {
    pub fn sampler(&self) -> Duration {
        Duration::from_millis(self.sampler_ms)
    }

    pub fn relay(&self) -> Duration {
        Duration::from_millis(self.relay_ms)
    }

    pub fn actuator(&self) -> Duration {
        Duration::from_millis(self.actuator_ms)
    }

    pub fn printer(&self) -> Duration {
        Duration::from_millis(self.printer_ms)
    }
}

/// Servo and motor bank options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Write `180 − target` to the servos (spools mounted reversed).
    pub mirrored: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self { mirrored: true }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GloveConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Complete deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GloveConfig {
    pub sampler: SamplerConfig,
    pub calibration: CalibrationConfig,
    pub link: LinkConfig,
    pub debug: DebugConfig,
    pub timing: TimingConfig,
    pub actuators: ActuatorConfig,
}

impl GloveConfig {
    /// Reject settings the runtime cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`EchoError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), EchoError> {
        let periods = [
            ("timing.sampler_ms", self.timing.sampler_ms),
            ("timing.relay_ms", self.timing.relay_ms),
            ("timing.actuator_ms", self.timing.actuator_ms),
            ("timing.printer_ms", self.timing.printer_ms),
            ("calibration.sample_interval_ms", self.calibration.sample_interval_ms),
        ];
        if let Some((field, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(EchoError::Config(format!("{field} must be greater than zero")));
        }
        if !(1..=MAX_JOYSTICK_SCALE).contains(&self.sampler.joystick_scale) {
            return Err(EchoError::Config(format!(
                "sampler.joystick_scale must lie in 1..={MAX_JOYSTICK_SCALE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.sampler.trigger.fraction) {
            return Err(EchoError::Config(
                "sampler.trigger.fraction must lie in 0..=1".to_string(),
            ));
        }
        if self.sampler.trigger.first == self.sampler.trigger.second {
            return Err(EchoError::Config(
                "sampler.trigger needs two different fingers".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echohand_perception::FilterStrategy;
    use echohand_types::Finger;

    #[test]
    fn defaults_match_reference_hardware() {
        let cfg = GloveConfig::default();
        assert_eq!(cfg.timing.sampler(), Duration::from_millis(30));
        assert_eq!(cfg.timing.relay(), Duration::from_millis(25));
        assert_eq!(cfg.timing.actuator(), Duration::from_millis(5));
        assert_eq!(cfg.timing.printer(), Duration::from_millis(20));
        assert_eq!(cfg.calibration.window(), Duration::from_secs(5));
        assert_eq!(cfg.sampler.filter.strategy, FilterStrategy::Average);
        assert_eq!(cfg.sampler.filter.sample_count, 16);
        assert_eq!(cfg.sampler.joystick_polarity, ButtonPolarity::ActiveLow);
        assert_eq!(cfg.link.splay, [511; FINGER_COUNT]);
        assert!(cfg.actuators.mirrored);
        assert!(!cfg.debug.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_toml_is_the_default() {
        let cfg: GloveConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GloveConfig::default());
    }

    #[test]
    fn toml_roundtrip_keeps_every_section() {
        let mut cfg = GloveConfig::default();
        cfg.sampler.filter = NoiseFilter::new(FilterStrategy::TrimmedMean, 8);
        cfg.sampler.joystick_polarity = ButtonPolarity::ActiveHigh;
        cfg.calibration.strategy = CalibrationStrategy::ObservedExtremes;
        cfg.link.kind = LinkKind::Serial;
        cfg.link.serial.port = "/dev/ttyUSB0".to_string();
        cfg.debug.enabled = true;
        cfg.debug.style = DebugStyle::Plotter;

        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: GloveConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let cfg: GloveConfig = toml::from_str(
            r#"
            [sampler]
            joystick_polarity = "active_high"

            [sampler.filter]
            strategy = "median"

            [link.serial]
            port = "COM3"
            baud = 38400
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sampler.filter.strategy, FilterStrategy::Median);
        assert_eq!(cfg.sampler.filter.sample_count, 16);
        assert_eq!(cfg.sampler.joystick_scale, 1024);
        assert_eq!(cfg.link.serial.baud, 38_400);
        assert_eq!(cfg.link.serial.data_bits, 8);
        assert_eq!(cfg.link.wire, WireFormat::Ascii);
    }

    #[test]
    fn validate_rejects_zero_periods() {
        let mut cfg = GloveConfig::default();
        cfg.timing.relay_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("timing.relay_ms"));
    }

    #[test]
    fn validate_rejects_bad_trigger() {
        let mut cfg = GloveConfig::default();
        cfg.sampler.trigger.second = Finger::Thumb;
        assert!(cfg.validate().is_err());

        let mut cfg = GloveConfig::default();
        cfg.sampler.trigger.fraction = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_joystick_scale() {
        let mut cfg = GloveConfig::default();
        cfg.sampler.joystick_scale = 1_000_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sampler.joystick_scale"));

        cfg.sampler.joystick_scale = 0;
        assert!(cfg.validate().is_err());

        cfg.sampler.joystick_scale = MAX_JOYSTICK_SCALE;
        assert!(cfg.validate().is_ok());
    }
}
