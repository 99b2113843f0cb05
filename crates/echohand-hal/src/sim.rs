//! In-process glove simulation for tests and desktop runs.
//!
//! [`SimGlove`] produces flex readings from a scripted hand pose plus seeded
//! Gaussian noise, so a given seed always yields the same sample stream.
//! [`SimServo`] and [`SimMotor`] record what they are told; clones share
//! state, so a test can keep one clone and hand the other to the runtime.
//!
//! # Example
//!
//! ```rust
//! use echohand_hal::sim::SimGlove;
//! use echohand_hal::GloveSensors;
//! use echohand_types::Finger;
//!
//! let mut glove = SimGlove::builder().seed(7).noise_stddev(0.0).build();
//! let pose = glove.handle();
//!
//! pose.set_curl(Finger::Index, 1.0);
//! assert_eq!(glove.read_flex_millivolts(Finger::Index).unwrap(), 400);
//! assert_eq!(glove.read_flex_millivolts(Finger::Thumb).unwrap(), 1250);
//! ```

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use echohand_types::{EchoError, FINGER_COUNT, Finger};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

use crate::sensors::{ButtonLevels, CalibrationCue, GloveSensors};
use crate::servo::Servo;
use crate::vibration::VibrationMotor;

/// Joystick resting position in ADC counts.
const JOYSTICK_CENTER: u16 = 2048;
const ADC_MAX: u16 = 4095;

// ────────────────────────────────────────────────────────────────────────────
// Pose shared between the glove and its handles
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Pose {
    // 0.0 = open, 1.0 = fist.
    curls: [f32; FINGER_COUNT],
    joystick: (u16, u16),
    levels: ButtonLevels,
    battery: Option<u8>,
    cues: Vec<CalibrationCue>,
    flex_fault: bool,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            curls: [0.0; FINGER_COUNT],
            joystick: (JOYSTICK_CENTER, JOYSTICK_CENTER),
            // Pull-up joystick click reads high while released.
            levels: ButtonLevels {
                joystick_click: true,
                a: false,
                b: false,
            },
            battery: None,
            cues: Vec::new(),
            flex_fault: false,
        }
    }
}

type SharedPose = Arc<Mutex<Pose>>;

fn lock(pose: &SharedPose) -> std::sync::MutexGuard<'_, Pose> {
    pose.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remote control for a [`SimGlove`]'s pose.
#[derive(Debug, Clone)]
pub struct SimGloveHandle {
    pose: SharedPose,
}

impl SimGloveHandle {
    /// Curl one finger; `fraction` is clamped to `0..=1`.
    pub fn set_curl(&self, finger: Finger, fraction: f32) {
        lock(&self.pose).curls[finger.index()] = fraction.clamp(0.0, 1.0);
    }

    pub fn set_all_curls(&self, fraction: f32) {
        lock(&self.pose).curls = [fraction.clamp(0.0, 1.0); FINGER_COUNT];
    }

    pub fn open_hand(&self) {
        self.set_all_curls(0.0);
    }

    pub fn close_hand(&self) {
        self.set_all_curls(1.0);
    }

    /// Joystick position in ADC counts, clamped to 12 bits.
    pub fn set_joystick(&self, x: u16, y: u16) {
        lock(&self.pose).joystick = (x.min(ADC_MAX), y.min(ADC_MAX));
    }

    pub fn set_levels(&self, levels: ButtonLevels) {
        lock(&self.pose).levels = levels;
    }

    pub fn set_battery(&self, percent: Option<u8>) {
        lock(&self.pose).battery = percent;
    }

    /// Make every flex read fail until cleared.
    pub fn set_flex_fault(&self, fault: bool) {
        lock(&self.pose).flex_fault = fault;
    }

    /// Calibration cues received so far, oldest first.
    pub fn cues(&self) -> Vec<CalibrationCue> {
        lock(&self.pose).cues.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated glove
// ────────────────────────────────────────────────────────────────────────────

/// Simulated sensor board.
pub struct SimGlove {
    pose: SharedPose,
    rng: SmallRng,
    open_mv: i32,
    closed_mv: i32,
    noise_stddev: f32,
    follow_cues: bool,
}

impl SimGlove {
    pub fn builder() -> SimGloveBuilder {
        SimGloveBuilder::default()
    }

    pub fn handle(&self) -> SimGloveHandle {
        SimGloveHandle {
            pose: Arc::clone(&self.pose),
        }
    }

    fn noise(&mut self) -> f32 {
        if self.noise_stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * self.noise_stddev
    }
}

impl GloveSensors for SimGlove {
    fn read_flex_millivolts(&mut self, finger: Finger) -> Result<i32, EchoError> {
        let (curl, fault) = {
            let pose = lock(&self.pose);
            (pose.curls[finger.index()], pose.flex_fault)
        };
        if fault {
            return Err(EchoError::HardwareFault {
                component: format!("{}_flex", finger.label().to_lowercase()),
                details: "simulated ADC fault".to_string(),
            });
        }
        let span = (self.closed_mv - self.open_mv) as f32;
        let clean = self.open_mv as f32 + span * curl;
        Ok((clean + self.noise()).round().max(0.0) as i32)
    }

    fn read_joystick_raw(&mut self) -> Result<(u16, u16), EchoError> {
        Ok(lock(&self.pose).joystick)
    }

    fn read_button_levels(&mut self) -> Result<ButtonLevels, EchoError> {
        Ok(lock(&self.pose).levels)
    }

    fn read_battery_percent(&mut self) -> Result<Option<u8>, EchoError> {
        Ok(lock(&self.pose).battery)
    }

    fn signal(&mut self, cue: CalibrationCue) {
        let mut pose = lock(&self.pose);
        pose.cues.push(cue);
        if self.follow_cues {
            match cue {
                CalibrationCue::OpenHand => pose.curls = [0.0; FINGER_COUNT],
                CalibrationCue::ClosedHand => pose.curls = [1.0; FINGER_COUNT],
                CalibrationCue::Done => {}
            }
        }
    }
}

/// Builder for [`SimGlove`].
///
/// Defaults: seed from entropy, 1250 mV open, 400 mV closed, 6 mV noise,
/// and the simulated wearer obeys calibration cues.
#[derive(Debug, Clone)]
pub struct SimGloveBuilder {
    seed: Option<u64>,
    open_mv: i32,
    closed_mv: i32,
    noise_stddev: f32,
    follow_cues: bool,
}

impl Default for SimGloveBuilder {
    fn default() -> Self {
        Self {
            seed: None,
            open_mv: 1250,
            closed_mv: 400,
            noise_stddev: 6.0,
            follow_cues: true,
        }
    }
}

impl SimGloveBuilder {
    /// Fixed seed; `0` means "use entropy".
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = (seed != 0).then_some(seed);
        self
    }

    /// Flex readings for a fully open and a fully closed finger.
    pub fn millivolt_range(mut self, open_mv: i32, closed_mv: i32) -> Self {
        self.open_mv = open_mv;
        self.closed_mv = closed_mv;
        self
    }

    pub fn noise_stddev(mut self, stddev: f32) -> Self {
        self.noise_stddev = stddev.max(0.0);
        self
    }

    /// Whether calibration cues move the hand to the requested pose.
    pub fn follow_cues(mut self, follow: bool) -> Self {
        self.follow_cues = follow;
        self
    }

    pub fn build(self) -> SimGlove {
        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        SimGlove {
            pose: SharedPose::default(),
            rng,
            open_mv: self.open_mv,
            closed_mv: self.closed_mv,
            noise_stddev: self.noise_stddev,
            follow_cues: self.follow_cues,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recording actuators
// ────────────────────────────────────────────────────────────────────────────

/// Simulated servo. Clones share the recorded angle.
#[derive(Debug, Clone)]
pub struct SimServo {
    id: String,
    degrees: Arc<AtomicI32>,
    writes: Arc<AtomicUsize>,
    faulted: Arc<AtomicBool>,
}

impl SimServo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            degrees: Arc::new(AtomicI32::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            faulted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One servo per finger, named `<finger>_servo`.
    pub fn set_of_five() -> [SimServo; FINGER_COUNT] {
        Finger::ALL.map(|f| SimServo::new(format!("{}_servo", f.label().to_lowercase())))
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Make writes fail until cleared.
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::Release);
    }
}

impl Servo for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_degrees(&mut self, degrees: i32) -> Result<(), EchoError> {
        if self.faulted.load(Ordering::Acquire) {
            return Err(EchoError::HardwareFault {
                component: self.id.clone(),
                details: "simulated servo fault".to_string(),
            });
        }
        self.degrees.store(degrees, Ordering::Release);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn degrees(&self) -> i32 {
        self.degrees.load(Ordering::Acquire)
    }
}

/// Simulated vibration motor. Clones share the recorded speed.
#[derive(Debug, Clone)]
pub struct SimMotor {
    id: String,
    rpm: Arc<AtomicU16>,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rpm: Arc::new(AtomicU16::new(0)),
        }
    }

    /// One motor per finger, named `<finger>_motor`.
    pub fn set_of_five() -> [SimMotor; FINGER_COUNT] {
        Finger::ALL.map(|f| SimMotor::new(format!("{}_motor", f.label().to_lowercase())))
    }
}

impl VibrationMotor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_rpm(&mut self, rpm: u16) -> Result<(), EchoError> {
        self.rpm.store(rpm, Ordering::Release);
        Ok(())
    }

    fn rpm(&self) -> u16 {
        self.rpm.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_samples() {
        let mut a = SimGlove::builder().seed(42).build();
        let mut b = SimGlove::builder().seed(42).build();
        for _ in 0..50 {
            assert_eq!(
                a.read_flex_millivolts(Finger::Middle).unwrap(),
                b.read_flex_millivolts(Finger::Middle).unwrap()
            );
        }
    }

    #[test]
    fn noise_stays_near_the_pose() {
        let mut glove = SimGlove::builder().seed(3).noise_stddev(5.0).build();
        glove.handle().set_curl(Finger::Ring, 0.5);
        for _ in 0..200 {
            let mv = glove.read_flex_millivolts(Finger::Ring).unwrap();
            assert!((mv - 825).abs() < 60, "reading {mv} too far from 825");
        }
    }

    #[test]
    fn cues_drive_the_pose_when_followed() {
        let mut glove = SimGlove::builder().seed(1).noise_stddev(0.0).build();
        glove.signal(CalibrationCue::ClosedHand);
        assert_eq!(glove.read_flex_millivolts(Finger::Pinky).unwrap(), 400);
        glove.signal(CalibrationCue::OpenHand);
        assert_eq!(glove.read_flex_millivolts(Finger::Pinky).unwrap(), 1250);
        glove.signal(CalibrationCue::Done);
        assert_eq!(
            glove.handle().cues(),
            vec![
                CalibrationCue::ClosedHand,
                CalibrationCue::OpenHand,
                CalibrationCue::Done
            ]
        );
    }

    #[test]
    fn cues_are_recorded_but_ignored_when_not_followed() {
        let mut glove = SimGlove::builder()
            .seed(1)
            .noise_stddev(0.0)
            .follow_cues(false)
            .build();
        glove.signal(CalibrationCue::ClosedHand);
        assert_eq!(glove.read_flex_millivolts(Finger::Thumb).unwrap(), 1250);
        assert_eq!(glove.handle().cues().len(), 1);
    }

    #[test]
    fn handle_controls_inputs_and_faults() {
        let mut glove = SimGlove::builder().seed(9).build();
        let handle = glove.handle();

        assert_eq!(glove.read_joystick_raw().unwrap(), (2048, 2048));
        handle.set_joystick(5000, 10);
        assert_eq!(glove.read_joystick_raw().unwrap(), (4095, 10));

        assert!(glove.read_button_levels().unwrap().joystick_click);
        assert_eq!(glove.read_battery_percent().unwrap(), None);
        handle.set_battery(Some(64));
        assert_eq!(glove.read_battery_percent().unwrap(), Some(64));

        handle.set_flex_fault(true);
        assert!(matches!(
            glove.read_flex_millivolts(Finger::Index),
            Err(EchoError::HardwareFault { .. })
        ));
    }

    #[test]
    fn servo_clones_share_state() {
        let probe = SimServo::new("thumb_servo");
        let mut driver: Box<dyn Servo> = Box::new(probe.clone());
        driver.write_degrees(120).unwrap();
        assert_eq!(probe.degrees(), 120);
        assert_eq!(probe.writes(), 1);

        probe.set_faulted(true);
        assert!(driver.write_degrees(10).is_err());
        assert_eq!(probe.degrees(), 120);
    }

    #[test]
    fn motor_sets_are_named_per_finger() {
        let motors = SimMotor::set_of_five();
        assert_eq!(motors[0].id(), "thumb_motor");
        assert_eq!(SimServo::set_of_five()[4].id(), "pinky_servo");
    }
}
