//! Host-side decoder for telemetry lines.
//!
//! Understands the full OpenGloves letter set, not just the subset the glove
//! emits, so the same decoder serves recorded traffic from other devices.
//!
//! | Key | Meaning | Scaling |
//! |---|---|---|
//! | `A`..`E` | finger curl | `/ 4095` → `0..=1` |
//! | `F`, `G` | joystick X / Y | `/ 4095` → `-1..=1` |
//! | `H` | joystick click | boolean |
//! | `I` `J` `K` `L` `N` `O` | trigger, A, B, grab, system, calibrate | boolean |
//! | `P` | analog trigger | `/ 4095` |
//! | `(xB)` | splay of finger `x` | `/ 4095` |
//! | `(xAy)` | joint `y` of finger `x` | `/ 4095` |
//!
//! A boolean letter without digits means `true`. Every parse clears the
//! booleans first, so a letter missing from a line means released.
//!
//! # Example
//!
//! ```rust
//! use echohand_protocol::HostGloveState;
//!
//! let mut glove = HostGloveState::default();
//! glove.parse_line("A4095B0C0D0E0F2048G2048HJ");
//! assert_eq!(glove.finger_curls[0], 1.0);
//! assert!(glove.joystick_button && glove.button_a && !glove.button_b);
//! ```

use echohand_types::{Button, CURL_MAX, FINGER_COUNT};
use serde::{Deserialize, Serialize};

/// Joints tracked per finger by the extended `(xAy)` keys.
pub const JOINTS_PER_FINGER: usize = 4;

const SCALE: f32 = CURL_MAX as f32;

/// Latest decoded glove state as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostGloveState {
    pub finger_curls: [f32; FINGER_COUNT],
    pub joint_curls: [[f32; JOINTS_PER_FINGER]; FINGER_COUNT],
    pub splay: [f32; FINGER_COUNT],
    pub joystick: [f32; 2],
    pub joystick_button: bool,
    pub button_trigger: bool,
    pub button_a: bool,
    pub button_b: bool,
    pub button_grab: bool,
    pub button_system: bool,
    pub button_calibrate: bool,
    pub trigger_analog: f32,
}

impl HostGloveState {
    /// Apply one telemetry line (with or without its `\n`).
    pub fn parse_line(&mut self, line: &str) {
        self.clear_buttons();

        let bytes = line.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let byte = bytes[pos];
            if byte == b'(' {
                pos = self.parse_extension(bytes, pos + 1);
                continue;
            }
            pos += 1;
            if !byte.is_ascii_alphabetic() {
                continue;
            }
            let (value, next) = read_value(bytes, pos);
            pos = next;
            self.apply_key(byte, value);
        }
    }

    /// Bitmask in the device's button layout.
    ///
    /// The grab letter `L` carries the device's derived trigger.
    pub fn to_buttons_bitmask(&self) -> u32 {
        [
            (self.joystick_button, Button::JoystickClick),
            (self.button_a, Button::A),
            (self.button_b, Button::B),
            (self.button_grab, Button::Trigger),
        ]
        .into_iter()
        .filter(|(pressed, _)| *pressed)
        .fold(0, |mask, (_, button)| mask | button.mask())
    }

    fn clear_buttons(&mut self) {
        self.joystick_button = false;
        self.button_trigger = false;
        self.button_a = false;
        self.button_b = false;
        self.button_grab = false;
        self.button_system = false;
        self.button_calibrate = false;
    }

    fn apply_key(&mut self, key: u8, value: Option<f32>) {
        let scalar = value.unwrap_or(1.0);
        let flag = value.is_none_or(|v| v > 0.0);
        match key {
            b'A'..=b'E' => self.finger_curls[usize::from(key - b'A')] = scalar / SCALE,
            b'F' => self.joystick[0] = scalar / SCALE * 2.0 - 1.0,
            b'G' => self.joystick[1] = scalar / SCALE * 2.0 - 1.0,
            b'H' => self.joystick_button = flag,
            b'I' => self.button_trigger = flag,
            b'J' => self.button_a = flag,
            b'K' => self.button_b = flag,
            b'L' => self.button_grab = flag,
            b'N' => self.button_system = flag,
            b'O' => self.button_calibrate = flag,
            b'P' => self.trigger_analog = scalar / SCALE,
            _ => {}
        }
    }

    // `start` points just past '('. Returns the position to resume from.
    fn parse_extension(&mut self, bytes: &[u8], start: usize) -> usize {
        let Some(len) = bytes[start..].iter().position(|&b| b == b')') else {
            return bytes.len();
        };
        let key = &bytes[start..start + len];
        let (value, next) = read_value(bytes, start + len + 1);
        let scaled = value.unwrap_or(0.0) / SCALE;

        match key {
            [finger @ b'A'..=b'E', b'B'] => {
                self.splay[usize::from(*finger - b'A')] = scaled;
            }
            [finger @ b'A'..=b'E', b'A', joint @ b'A'..=b'D'] => {
                self.joint_curls[usize::from(*finger - b'A')][usize::from(*joint - b'A')] = scaled;
            }
            _ => {}
        }
        next
    }
}

/// Read a `digits[.digits]` run at `pos`. Returns the value, if any digits
/// were present, and the position after the run.
fn read_value(bytes: &[u8], pos: usize) -> (Option<f32>, usize) {
    let end = bytes[pos..]
        .iter()
        .position(|&b| !(b.is_ascii_digit() || b == b'.'))
        .map_or(bytes.len(), |n| pos + n);
    let run = &bytes[pos..end];
    if !run.iter().any(u8::is_ascii_digit) {
        return (None, end);
    }

    // Only the first point counts; "1.2.3" reads as 1.2.
    let numeric = match run.iter().position(|&b| b == b'.') {
        Some(point) => {
            let fraction = &run[point + 1..];
            let digits = fraction
                .iter()
                .position(|&b| b == b'.')
                .unwrap_or(fraction.len());
            &run[..point + 1 + digits]
        }
        None => run,
    };
    let value = std::str::from_utf8(numeric)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    (Some(value), end)
}
