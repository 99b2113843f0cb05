//! [`HapticBank`] – the glove's five servos and five vibration motors.
//!
//! The bank turns a [`StateSnapshot`] into driver calls. Servo targets are
//! clamped to `0..=180`. On the reference hardware the spools are mounted
//! facing the other way, so a mirrored bank writes `180 − target`.

use echohand_types::{EchoError, FINGER_COUNT, Finger, SERVO_MAX_DEGREES, StateSnapshot};
use tracing::warn;

use crate::servo::Servo;
use crate::vibration::VibrationMotor;

/// Five servos and five motors indexed by [`Finger`].
pub struct HapticBank {
    servos: Vec<Box<dyn Servo>>,
    motors: Vec<Box<dyn VibrationMotor>>,
    mirrored: bool,
}

impl HapticBank {
    /// Build a bank from exactly one servo and one motor per finger, in
    /// finger order. Mirroring is on by default.
    ///
    /// # Errors
    ///
    /// Returns [`EchoError::Config`] when either list is not five long.
    pub fn new(
        servos: Vec<Box<dyn Servo>>,
        motors: Vec<Box<dyn VibrationMotor>>,
    ) -> Result<Self, EchoError> {
        if servos.len() != FINGER_COUNT || motors.len() != FINGER_COUNT {
            return Err(EchoError::Config(format!(
                "haptic bank needs {FINGER_COUNT} servos and {FINGER_COUNT} motors, got {} and {}",
                servos.len(),
                motors.len()
            )));
        }
        Ok(Self {
            servos,
            motors,
            mirrored: true,
        })
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Horn angle actually written for a host `target`.
    pub fn servo_command(&self, target: i32) -> i32 {
        let target = target.clamp(0, SERVO_MAX_DEGREES);
        if self.mirrored {
            SERVO_MAX_DEGREES - target
        } else {
            target
        }
    }

    /// Drive every servo and motor from `snapshot`.
    ///
    /// A failing driver does not stop the others; the first error is
    /// returned after all ten writes were attempted.
    pub fn apply(&mut self, snapshot: &StateSnapshot) -> Result<(), EchoError> {
        let commands = snapshot.servo_target_angles.map(|t| self.servo_command(t));
        let mut first_err = None;

        for (servo, degrees) in self.servos.iter_mut().zip(commands) {
            if let Err(err) = servo.write_degrees(degrees) {
                first_err.get_or_insert(err);
            }
        }
        for (motor, rpm) in self.motors.iter_mut().zip(snapshot.vibration_rpms) {
            if let Err(err) = motor.set_rpm(rpm) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Open every spool and stop every motor.
    pub fn release_all(&mut self) -> Result<(), EchoError> {
        let open = self.servo_command(0);
        let mut first_err = None;
        for servo in &mut self.servos {
            if let Err(err) = servo.write_degrees(open) {
                warn!(servo = servo.id(), error = %err, "release failed");
                first_err.get_or_insert(err);
            }
        }
        for motor in &mut self.motors {
            if let Err(err) = motor.set_rpm(0) {
                warn!(motor = motor.id(), error = %err, "stop failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn servo(&self, finger: Finger) -> &dyn Servo {
        self.servos[finger.index()].as_ref()
    }

    pub fn motor(&self, finger: Finger) -> &dyn VibrationMotor {
        self.motors[finger.index()].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMotor, SimServo};

    fn sim_bank() -> (HapticBank, [SimServo; FINGER_COUNT], [SimMotor; FINGER_COUNT]) {
        let servos = SimServo::set_of_five();
        let motors = SimMotor::set_of_five();
        let bank = HapticBank::new(
            servos
                .iter()
                .map(|s| Box::new(s.clone()) as Box<dyn Servo>)
                .collect(),
            motors
                .iter()
                .map(|m| Box::new(m.clone()) as Box<dyn VibrationMotor>)
                .collect(),
        )
        .unwrap();
        (bank, servos, motors)
    }

    #[test]
    fn rejects_wrong_driver_count() {
        let result = HapticBank::new(Vec::new(), Vec::new());
        assert!(matches!(result, Err(EchoError::Config(_))));
    }

    #[test]
    fn mirrored_bank_inverts_and_clamps_targets() {
        let (mut bank, servos, motors) = sim_bank();
        assert!(bank.is_mirrored());

        let snap = StateSnapshot {
            servo_target_angles: [0, 90, 180, 200, -5],
            vibration_rpms: [0, 60, 120, 180, 240],
            ..StateSnapshot::default()
        };
        bank.apply(&snap).unwrap();

        let angles: Vec<i32> = servos.iter().map(|s| s.degrees()).collect();
        assert_eq!(angles, [180, 90, 0, 0, 180]);
        let rpms: Vec<u16> = motors.iter().map(|m| m.rpm()).collect();
        assert_eq!(rpms, [0, 60, 120, 180, 240]);
        assert_eq!(bank.servo(Finger::Index).degrees(), 90);
        assert_eq!(bank.motor(Finger::Pinky).rpm(), 240);
    }

    #[test]
    fn direct_bank_passes_targets_through() {
        let (bank, _, _) = sim_bank();
        let mut bank = bank.with_mirrored(false);
        let snap = StateSnapshot {
            servo_target_angles: [10, 20, 30, 40, 50],
            ..StateSnapshot::default()
        };
        bank.apply(&snap).unwrap();
        assert_eq!(bank.servo(Finger::Middle).degrees(), 30);
    }

    #[test]
    fn one_faulty_servo_does_not_block_the_rest() {
        let (mut bank, servos, motors) = sim_bank();
        servos[1].set_faulted(true);
        let snap = StateSnapshot {
            servo_target_angles: [180; FINGER_COUNT],
            vibration_rpms: [90; FINGER_COUNT],
            ..StateSnapshot::default()
        };
        let err = bank.apply(&snap).unwrap_err();
        assert!(err.to_string().contains("index_servo"));
        assert_eq!(servos[0].degrees(), 0);
        assert_eq!(servos[4].degrees(), 0);
        assert_eq!(servos[0].writes(), 1);
        assert_eq!(servos[1].writes(), 0);
        assert_eq!(motors[3].rpm(), 90);
    }

    #[test]
    fn release_opens_spools_and_stops_motors() {
        let (mut bank, servos, motors) = sim_bank();
        let snap = StateSnapshot {
            servo_target_angles: [120; FINGER_COUNT],
            vibration_rpms: [300; FINGER_COUNT],
            ..StateSnapshot::default()
        };
        bank.apply(&snap).unwrap();
        bank.release_all().unwrap();
        assert!(servos.iter().all(|s| s.degrees() == 180));
        assert!(motors.iter().all(|m| m.rpm() == 0));
    }
}
