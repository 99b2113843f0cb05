//! Force-feedback spool servo.

use echohand_types::EchoError;

/// A hobby servo driving one finger's spool.
///
/// Angles are whole degrees in `0..=180`; callers clamp before writing.
pub trait Servo: Send + Sync {
    /// Stable identifier, e.g. `"thumb_servo"`.
    fn id(&self) -> &str;

    /// Command the servo horn to `degrees`.
    ///
    /// # Errors
    ///
    /// Returns [`EchoError::HardwareFault`] if the servo is detached or the
    /// PWM channel rejects the write.
    fn write_degrees(&mut self, degrees: i32) -> Result<(), EchoError>;

    /// Last angle successfully written.
    fn degrees(&self) -> i32;
}
