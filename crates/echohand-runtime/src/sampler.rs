//! [`SensorSampler`] – the producer of finger, joystick and button state.
//!
//! One [`SensorSampler::tick`]:
//!
//! 1. reads a burst per flex sensor and reduces it with the configured
//!    [`NoiseFilter`];
//! 2. remaps each value through the calibrated [`CurlMapper`];
//! 3. derives the trigger from the [`TriggerRule`];
//! 4. scales the joystick and resolves button polarity;
//! 5. publishes everything in one broker batch, so readers never see half a
//!    frame.
//!
//! [`SensorSampler::calibrate`] runs the open-hand and closed-hand windows
//! first; fingers it could not measure keep [`CalibrationRange::FACTORY`].

use std::sync::Arc;

use echohand_hal::{ButtonLevels, CalibrationCue, GloveSensors};
use echohand_middleware::StateBroker;
use echohand_perception::{
    CalibrationPhase, CalibrationRange, CalibrationSession, CurlMapper, NoiseFilter, TriggerRule,
};
use echohand_types::{Button, ButtonPolarity, CURL_MAX, EchoError, FINGER_COUNT, Finger};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::config::{CalibrationConfig, SamplerConfig};

/// Reads the glove's inputs and publishes them to the broker.
pub struct SensorSampler<S> {
    sensors: S,
    broker: Arc<StateBroker>,
    filter: NoiseFilter,
    mapper: CurlMapper,
    trigger: TriggerRule,
    joystick_polarity: ButtonPolarity,
    joystick_scale: i32,
}

impl<S: GloveSensors> SensorSampler<S> {
    /// Sampler using the factory range until [`SensorSampler::calibrate`]
    /// or [`SensorSampler::set_ranges`] says otherwise.
    pub fn new(sensors: S, broker: Arc<StateBroker>, config: &SamplerConfig) -> Self {
        let mut mapper = CurlMapper::default();
        mapper.invert = config.invert_curl;
        Self {
            sensors,
            broker,
            filter: config.filter,
            mapper,
            trigger: config.trigger,
            joystick_polarity: config.joystick_polarity,
            joystick_scale: config.joystick_scale,
        }
    }

    pub fn mapper(&self) -> &CurlMapper {
        &self.mapper
    }

    pub fn set_ranges(&mut self, ranges: [CalibrationRange; FINGER_COUNT]) {
        self.mapper.ranges = ranges;
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    /// Run both calibration windows and install the resulting ranges.
    ///
    /// Each window lasts `config.window()` of wall-clock time. A disabled
    /// calibration installs the factory range immediately. Read failures
    /// inside a window drop that sample only.
    #[instrument(skip_all, fields(strategy = ?config.strategy))]
    pub async fn calibrate(
        &mut self,
        config: &CalibrationConfig,
    ) -> [CalibrationRange; FINGER_COUNT] {
        if !config.enabled {
            info!("calibration disabled, using factory range");
            self.set_ranges([CalibrationRange::FACTORY; FINGER_COUNT]);
            return self.mapper.ranges;
        }

        let mut session = CalibrationSession::new(config.strategy);
        for (cue, phase) in [
            (CalibrationCue::OpenHand, CalibrationPhase::OpenHand),
            (CalibrationCue::ClosedHand, CalibrationPhase::ClosedHand),
        ] {
            self.sensors.signal(cue);
            info!(?phase, window_ms = config.window_ms, "calibration window open");
            self.record_window(&mut session, phase, config).await;
        }
        self.sensors.signal(CalibrationCue::Done);

        let ranges = Finger::ALL.map(|finger| {
            session.range(finger).unwrap_or_else(|| {
                warn!(?finger, "no calibration samples, using factory range");
                CalibrationRange::FACTORY
            })
        });
        info!(?ranges, "calibration complete");
        self.set_ranges(ranges);
        ranges
    }

    async fn record_window(
        &mut self,
        session: &mut CalibrationSession,
        phase: CalibrationPhase,
        config: &CalibrationConfig,
    ) {
        let deadline = Instant::now() + config.window();
        while Instant::now() < deadline {
            match self.read_flex() {
                Ok(raw) => session.record(phase, raw.map(|v| v.round() as i32)),
                Err(err) => debug!(error = %err, "calibration sample dropped"),
            }
            sleep(config.sample_interval()).await;
        }
    }

    /// Filtered flex readings in millivolts, thumb first.
    ///
    /// # Errors
    ///
    /// Propagates the first sensor error; nothing is published.
    pub fn read_flex(&mut self) -> Result<[f64; FINGER_COUNT], EchoError> {
        let filter = self.filter;
        let mut raw = [0.0; FINGER_COUNT];
        for finger in Finger::ALL {
            let value = filter.sample(|| self.sensors.read_flex_millivolts(finger))?;
            raw[finger.index()] = value.ok_or_else(|| EchoError::HardwareFault {
                component: format!("{}_flex", finger.label().to_lowercase()),
                details: "empty sample burst".to_string(),
            })?;
        }
        Ok(raw)
    }

    /// Sample every input once and publish the frame.
    ///
    /// # Errors
    ///
    /// Returns the first sensor error. The broker is left untouched, so a
    /// failed tick never publishes a partial frame.
    pub fn tick(&mut self) -> Result<(), EchoError> {
        let raw = self.read_flex()?;
        let curls = self.mapper.curls(raw);
        let trigger = self.trigger.is_pressed(&curls, self.mapper.out_max);
        let (raw_x, raw_y) = self.sensors.read_joystick_raw()?;
        let levels = self.sensors.read_button_levels()?;
        let battery = self.sensors.read_battery_percent()?;

        let joystick = (self.scale_axis(raw_x), self.scale_axis(raw_y));
        let mask = buttons_bitmask(levels, self.joystick_polarity, trigger);

        self.broker.batch(|w| {
            for (index, curl) in curls.into_iter().enumerate() {
                w.set_finger_angle(index, curl);
            }
            w.set_joystick(joystick.0, joystick.1);
            w.set_buttons_bitmask(mask);
            if let Some(percent) = battery {
                w.set_battery_percent(percent);
            }
        });
        Ok(())
    }

    // Integer scaling, matching an Arduino-style map().
    fn scale_axis(&self, raw: u16) -> f32 {
        (i64::from(raw) * i64::from(self.joystick_scale) / i64::from(CURL_MAX)) as f32
    }
}

/// Combine raw input levels and the derived trigger into a pressed-bitmask.
///
/// The A and B inputs are active-high; the joystick click follows `polarity`.
pub fn buttons_bitmask(levels: ButtonLevels, polarity: ButtonPolarity, trigger: bool) -> u32 {
    [
        (levels.b, Button::B),
        (levels.a, Button::A),
        (polarity.is_pressed(levels.joystick_click), Button::JoystickClick),
        (trigger, Button::Trigger),
    ]
    .into_iter()
    .filter(|(pressed, _)| *pressed)
    .fold(0, |mask, (_, button)| mask | button.mask())
}
