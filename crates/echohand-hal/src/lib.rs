//! `echohand-hal` – Hardware Abstraction Layer.
//!
//! The runtime never touches pins, ADCs or PWM directly; it talks to the
//! traits below. Real drivers live with the board support code, simulated
//! ones ship here so the whole pipeline runs on a desktop.
//!
//! # Modules
//!
//! - [`sensors`] – [`GloveSensors`]: flex millivolts, joystick ADC, button
//!   levels, battery and the calibration cue.
//! - [`servo`] – [`Servo`]: one force-feedback spool servo.
//! - [`vibration`] – [`VibrationMotor`]: one haptic motor.
//! - [`bank`] – [`HapticBank`]: five servos and five motors addressed by
//!   finger, driven straight from a state snapshot.
//! - [`sim`] – [`SimGlove`], [`SimServo`], [`SimMotor`]: deterministic
//!   stand-ins for tests and the `simulate` command.

pub mod bank;
pub mod sensors;
pub mod servo;
pub mod sim;
pub mod vibration;

pub use bank::HapticBank;
pub use sensors::{ButtonLevels, CalibrationCue, GloveSensors};
pub use servo::Servo;
pub use sim::{SimGlove, SimGloveBuilder, SimGloveHandle, SimMotor, SimServo};
pub use vibration::VibrationMotor;
