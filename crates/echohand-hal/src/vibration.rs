//! Haptic vibration motor.

use echohand_types::EchoError;

/// One eccentric-mass vibration motor.
pub trait VibrationMotor: Send + Sync {
    /// Stable identifier, e.g. `"index_motor"`.
    fn id(&self) -> &str;

    /// Spin at `rpm`; `0` stops the motor.
    ///
    /// # Errors
    ///
    /// Returns [`EchoError::HardwareFault`] if the driver rejects the speed.
    fn set_rpm(&mut self, rpm: u16) -> Result<(), EchoError>;

    fn rpm(&self) -> u16;
}
