//! [`ActuatorDriver`] – pushes host targets out to the servos and motors.

use std::sync::Arc;

use echohand_hal::HapticBank;
use echohand_middleware::StateBroker;
use echohand_types::EchoError;

/// Drives a [`HapticBank`] from the broker's current servo and vibration
/// targets. Every tick rewrites every driver, so a servo that was knocked
/// off target is pulled back within one period.
pub struct ActuatorDriver {
    bank: HapticBank,
    broker: Arc<StateBroker>,
}

impl ActuatorDriver {
    pub fn new(bank: HapticBank, broker: Arc<StateBroker>) -> Self {
        Self { bank, broker }
    }

    pub fn bank(&self) -> &HapticBank {
        &self.bank
    }

    /// Apply the latest snapshot.
    ///
    /// # Errors
    ///
    /// The first driver error; the remaining drivers were still written.
    pub fn tick(&mut self) -> Result<(), EchoError> {
        let snapshot = self.broker.take_snapshot();
        self.bank.apply(&snapshot)
    }

    /// Open every spool and stop every motor.
    pub fn release(&mut self) -> Result<(), EchoError> {
        self.bank.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echohand_hal::{Servo, SimMotor, SimServo, VibrationMotor};
    use echohand_types::{FINGER_COUNT, Finger};

    fn driver(mirrored: bool) -> (ActuatorDriver, [SimServo; FINGER_COUNT], Arc<StateBroker>) {
        let servos = SimServo::set_of_five();
        let motors = SimMotor::set_of_five();
        let bank = HapticBank::new(
            servos.iter().map(|s| Box::new(s.clone()) as Box<dyn Servo>).collect(),
            motors.iter().map(|m| Box::new(m.clone()) as Box<dyn VibrationMotor>).collect(),
        )
        .unwrap()
        .with_mirrored(mirrored);
        let broker = Arc::new(StateBroker::new());
        (ActuatorDriver::new(bank, Arc::clone(&broker)), servos, broker)
    }

    #[test]
    fn tick_follows_broker_targets() {
        let (mut driver, servos, broker) = driver(true);
        broker.set_servo_target_angle(Finger::Ring.index(), 45);
        broker.set_vibration_rpm(Finger::Thumb.index(), 120);

        driver.tick().unwrap();
        assert_eq!(servos[3].degrees(), 135);
        assert_eq!(servos[0].degrees(), 180);
        assert_eq!(driver.bank().motor(Finger::Thumb).rpm(), 120);
    }

    #[test]
    fn every_tick_rewrites_the_drivers() {
        let (mut driver, servos, _) = driver(false);
        driver.tick().unwrap();
        driver.tick().unwrap();
        assert_eq!(servos[2].writes(), 2);
    }

    #[test]
    fn release_returns_to_open() {
        let (mut driver, servos, broker) = driver(false);
        broker.set_servo_target_angle(0, 170);
        driver.tick().unwrap();
        driver.release().unwrap();
        assert_eq!(servos[0].degrees(), 0);
    }
}
