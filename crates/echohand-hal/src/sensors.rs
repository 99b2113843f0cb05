//! Glove sensor board trait.

use echohand_types::{EchoError, Finger};

/// Raw electrical levels of the digital inputs, `true` = high.
///
/// Polarity is not resolved here; the sampler decides what "pressed" means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonLevels {
    pub joystick_click: bool,
    pub a: bool,
    pub b: bool,
}

/// Cues sent to the wearer while calibrating (an LED blink on hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationCue {
    /// Open the hand fully and hold.
    OpenHand,
    /// Close the hand into a fist and hold.
    ClosedHand,
    /// Calibration finished.
    Done,
}

/// The analog and digital inputs of one glove.
pub trait GloveSensors: Send {
    /// One flex sensor reading in millivolts.
    ///
    /// # Errors
    ///
    /// Returns [`EchoError::HardwareFault`] when the channel cannot be read.
    fn read_flex_millivolts(&mut self, finger: Finger) -> Result<i32, EchoError>;

    /// Joystick X/Y as 12-bit ADC counts (`0..=4095`).
    fn read_joystick_raw(&mut self) -> Result<(u16, u16), EchoError>;

    fn read_button_levels(&mut self) -> Result<ButtonLevels, EchoError>;

    /// Battery charge, or `None` on boards without a fuel gauge.
    fn read_battery_percent(&mut self) -> Result<Option<u8>, EchoError> {
        Ok(None)
    }

    /// Tell the wearer what to do next. Boards without an indicator ignore it.
    fn signal(&mut self, _cue: CalibrationCue) {}
}

impl<T: GloveSensors + ?Sized> GloveSensors for Box<T> {
    fn read_flex_millivolts(&mut self, finger: Finger) -> Result<i32, EchoError> {
        (**self).read_flex_millivolts(finger)
    }

    fn read_joystick_raw(&mut self) -> Result<(u16, u16), EchoError> {
        (**self).read_joystick_raw()
    }

    fn read_button_levels(&mut self) -> Result<ButtonLevels, EchoError> {
        (**self).read_button_levels()
    }

    fn read_battery_percent(&mut self) -> Result<Option<u8>, EchoError> {
        (**self).read_battery_percent()
    }

    fn signal(&mut self, cue: CalibrationCue) {
        (**self).signal(cue)
    }
}
