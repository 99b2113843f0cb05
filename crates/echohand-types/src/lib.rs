use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of instrumented fingers on the glove.
pub const FINGER_COUNT: usize = 5;

/// Full-scale curl value in the glove's native units (OpenGloves 12-bit scalar).
pub const CURL_MAX: i32 = 4095;

/// Full-scale servo target angle in degrees.
pub const SERVO_MAX_DEGREES: i32 = 180;

/// Battery level reported until a sensor board provides a reading.
pub const DEFAULT_BATTERY_PERCENT: u8 = 100;

/// One finger of the glove, in wire order (thumb first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// Every finger in declared (wire) order.
    pub const ALL: [Finger; FINGER_COUNT] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Position of this finger in index-addressed arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Finger at `index`, or `None` when out of range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human readable label used by debug output.
    pub fn label(self) -> &'static str {
        match self {
            Finger::Thumb => "Thumb",
            Finger::Index => "Index",
            Finger::Middle => "Middle",
            Finger::Ring => "Ring",
            Finger::Pinky => "Pinky",
        }
    }
}

/// Logical buttons carried in [`StateSnapshot::buttons_bitmask`].
///
/// A set bit always means *pressed*; electrical polarity is resolved by the
/// sampler before the mask reaches the broker (see [`ButtonPolarity`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    /// B face button (bit 0).
    B,
    /// A face button (bit 1).
    A,
    /// Joystick click (bit 2).
    JoystickClick,
    /// Trigger derived from thumb + index curl (bit 3).
    Trigger,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::B, Button::A, Button::JoystickClick, Button::Trigger];

    /// Single-bit mask for this button.
    pub fn mask(self) -> u32 {
        match self {
            Button::B => 1 << 0,
            Button::A => 1 << 1,
            Button::JoystickClick => 1 << 2,
            Button::Trigger => 1 << 3,
        }
    }

    /// `true` when this button's bit is set in `bitmask`.
    pub fn is_set(self, bitmask: u32) -> bool {
        bitmask & self.mask() != 0
    }
}

/// Electrical level that means "pressed" for a digital input.
///
/// The joystick click is wired to a pull-up input, so the hardware reads low
/// while it is held. Pending hardware verification the default stays
/// [`ButtonPolarity::ActiveLow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonPolarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

impl ButtonPolarity {
    /// Translate a raw input level into "pressed".
    pub fn is_pressed(self, level_high: bool) -> bool {
        match self {
            ButtonPolarity::ActiveLow => !level_high,
            ButtonPolarity::ActiveHigh => level_high,
        }
    }
}

/// Point-in-time copy of the glove state held by the state broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Normalized curl per finger, `0..=CURL_MAX`.
    pub finger_angles: [i32; FINGER_COUNT],
    /// Host-commanded servo targets in degrees, `0..=180`.
    pub servo_target_angles: [i32; FINGER_COUNT],
    /// Host-commanded haptic motor speed.
    pub vibration_rpms: [u16; FINGER_COUNT],
    /// Joystick X/Y axis values.
    pub joystick_xy: [f32; 2],
    /// One bit per [`Button`]; set means pressed.
    pub buttons_bitmask: u32,
    pub battery_percent: u8,
    /// Mutation counter at the time the copy was taken.
    pub revision: u32,
}

impl StateSnapshot {
    /// `true` when `button` is pressed in this snapshot.
    pub fn is_pressed(&self, button: Button) -> bool {
        button.is_set(self.buttons_bitmask)
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            finger_angles: [0; FINGER_COUNT],
            servo_target_angles: [0; FINGER_COUNT],
            vibration_rpms: [0; FINGER_COUNT],
            joystick_xy: [0.0; 2],
            buttons_bitmask: 0,
            battery_percent: DEFAULT_BATTERY_PERCENT,
            revision: 0,
        }
    }
}

/// Error type shared by the hardware, transport and configuration layers.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum EchoError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finger_order_matches_wire_order() {
        let labels: Vec<_> = Finger::ALL.iter().map(|f| f.label()).collect();
        assert_eq!(labels, ["Thumb", "Index", "Middle", "Ring", "Pinky"]);
        for (i, finger) in Finger::ALL.iter().enumerate() {
            assert_eq!(finger.index(), i);
            assert_eq!(Finger::from_index(i), Some(*finger));
        }
        assert_eq!(Finger::from_index(FINGER_COUNT), None);
    }

    #[test]
    fn button_masks_are_distinct_single_bits() {
        let combined = Button::ALL.iter().fold(0u32, |acc, b| {
            assert_eq!(b.mask().count_ones(), 1);
            assert_eq!(acc & b.mask(), 0);
            acc | b.mask()
        });
        assert_eq!(combined, 0b1111);
        assert_eq!(Button::JoystickClick.mask(), 0b100);
    }

    #[test]
    fn polarity_translates_levels() {
        assert!(ButtonPolarity::ActiveLow.is_pressed(false));
        assert!(!ButtonPolarity::ActiveLow.is_pressed(true));
        assert!(ButtonPolarity::ActiveHigh.is_pressed(true));
        assert_eq!(ButtonPolarity::default(), ButtonPolarity::ActiveLow);
    }

    #[test]
    fn default_snapshot_reports_full_battery() {
        let snap = StateSnapshot::default();
        assert_eq!(snap.battery_percent, DEFAULT_BATTERY_PERCENT);
        assert_eq!(snap.revision, 0);
        assert!(!snap.is_pressed(Button::Trigger));
    }

    #[test]
    fn snapshot_serialization_roundtrip() {
        let snap = StateSnapshot {
            finger_angles: [1, 2, 3, 4, 4095],
            buttons_bitmask: Button::A.mask() | Button::Trigger.mask(),
            revision: 42,
            ..StateSnapshot::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
        assert!(back.is_pressed(Button::A));
        assert!(!back.is_pressed(Button::B));
    }

    #[test]
    fn polarity_uses_snake_case_names() {
        let json = serde_json::to_string(&ButtonPolarity::ActiveHigh).unwrap();
        assert_eq!(json, "\"active_high\"");
    }

    #[test]
    fn echo_error_display() {
        let err = EchoError::HardwareFault {
            component: "thumb_servo".to_string(),
            details: "not attached".to_string(),
        };
        assert!(err.to_string().contains("thumb_servo"));
        assert!(EchoError::Transport("closed".into()).to_string().contains("Transport"));
    }
}
