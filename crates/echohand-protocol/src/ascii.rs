//! ASCII line protocol (OpenGloves convention).
//!
//! Device → host telemetry:
//!
//! ```text
//! A<thumb>B<index>C<middle>D<ring>E<pinky>F<joy x>G<joy y>[L][H][J][K]\n
//! ```
//!
//! Button letters carry no value; presence means pressed.
//!
//! Host → device commands:
//!
//! ```text
//! A..E<thousandths of servo full scale>   F<revolutions per second>
//! ```
//!
//! e.g. `A500B1000C0D0E0F2.5\n` puts the thumb servo at 90°, the index servo
//! at 180°, the rest at 0°, and spins every haptic motor at 150 RPM.
//!
//! # Example
//!
//! ```rust
//! use echohand_protocol::{HostCommand, scan_commands};
//! use echohand_types::Finger;
//!
//! let cmds: Vec<_> = scan_commands(b"A500F2\n").collect();
//! assert_eq!(
//!     cmds,
//!     vec![
//!         Ok(HostCommand::ServoTarget { finger: Finger::Thumb, degrees: 90 }),
//!         Ok(HostCommand::Vibration { rpm: 120 }),
//!     ]
//! );
//! ```

use std::fmt::Write;

use echohand_types::{Button, FINGER_COUNT, Finger, SERVO_MAX_DEGREES, StateSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Largest inbound command line the device will look at, in bytes.
pub const COMMAND_LINE_CAPACITY: usize = 56;

/// Splay sent once when a link comes up (mid-scale, fingers straight ahead).
pub const DEFAULT_SPLAY: [i32; FINGER_COUNT] = [511; FINGER_COUNT];

/// Full scale of a servo value on the wire.
const SERVO_WIRE_SCALE: u64 = 1000;

// Letters in the order the device emits them.
const BUTTON_LETTERS: [(Button, char); 4] = [
    (Button::Trigger, 'L'),
    (Button::JoystickClick, 'H'),
    (Button::A, 'J'),
    (Button::B, 'K'),
];

// ────────────────────────────────────────────────────────────────────────────
// Telemetry (device → host)
// ────────────────────────────────────────────────────────────────────────────

/// Render one telemetry line, terminator included.
pub fn encode_telemetry(snapshot: &StateSnapshot) -> String {
    let mut line = String::with_capacity(64);
    for (finger, angle) in Finger::ALL.iter().zip(snapshot.finger_angles) {
        let _ = write!(line, "{}{}", finger_letter(*finger), angle);
    }
    let _ = write!(
        line,
        "F{}G{}",
        snapshot.joystick_xy[0] as i32, snapshot.joystick_xy[1] as i32
    );
    for (button, letter) in BUTTON_LETTERS {
        if snapshot.is_pressed(button) {
            line.push(letter);
        }
    }
    line.push('\n');
    line
}

/// Render the splay preamble: `(AB)511(BB)511(CB)511(DB)511(EB)511\n`.
pub fn encode_splay(splay: [i32; FINGER_COUNT]) -> String {
    let mut line = String::with_capacity(40);
    for (finger, value) in Finger::ALL.iter().zip(splay) {
        let _ = write!(line, "({}B){}", finger_letter(*finger), value);
    }
    line.push('\n');
    line
}

fn finger_letter(finger: Finger) -> char {
    (b'A' + finger.index() as u8) as char
}

// ────────────────────────────────────────────────────────────────────────────
// Commands (host → device)
// ────────────────────────────────────────────────────────────────────────────

/// One decoded host instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostCommand {
    /// Drive one finger's servo to `degrees` (`0..=180`).
    ServoTarget { finger: Finger, degrees: i32 },
    /// Spin all five haptic motors at `rpm`.
    Vibration { rpm: u16 },
}

/// Scan a command line, looking at no more than [`COMMAND_LINE_CAPACITY`]
/// bytes and stopping at the first `\n`.
pub fn scan_commands(line: &[u8]) -> CommandScanner<'_> {
    let bounded = &line[..line.len().min(COMMAND_LINE_CAPACITY)];
    let end = bounded
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(bounded.len());
    CommandScanner {
        bytes: &bounded[..end],
        pos: 0,
    }
}

/// Iterator over the tokens of one command line.
///
/// Bytes that do not start a known token are skipped silently.
#[derive(Debug, Clone)]
pub struct CommandScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CommandScanner<'a> {
    fn take_while(&mut self, mut pred: impl FnMut(u8) -> bool) -> &'a [u8] {
        let bytes = self.bytes;
        let start = self.pos;
        while self.pos < bytes.len() && pred(bytes[self.pos]) {
            self.pos += 1;
        }
        &bytes[start..self.pos]
    }

    fn servo(&mut self, letter: u8, offset: usize) -> Result<HostCommand, CommandError> {
        let letter_char = letter as char;
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(CommandError::MissingValue {
                letter: letter_char,
                offset,
            });
        }
        let value = digits
            .iter()
            .try_fold(0u32, |acc, d| {
                acc.checked_mul(10)?.checked_add(u32::from(d - b'0'))
            })
            .ok_or(CommandError::Overflow {
                letter: letter_char,
                offset,
            })?;

        let degrees = (SERVO_MAX_DEGREES as u64 * u64::from(value)) / SERVO_WIRE_SCALE;
        let finger = Finger::ALL[usize::from(letter - b'A')];
        Ok(HostCommand::ServoTarget {
            finger,
            degrees: degrees.min(SERVO_MAX_DEGREES as u64) as i32,
        })
    }

    fn vibration(&mut self, offset: usize) -> Result<HostCommand, CommandError> {
        let mut seen_point = false;
        let run = self.take_while(|b| match b {
            b'0'..=b'9' => true,
            b'.' if !seen_point => {
                seen_point = true;
                true
            }
            _ => false,
        });
        let missing = CommandError::MissingValue {
            letter: 'F',
            offset,
        };
        if !run.iter().any(u8::is_ascii_digit) {
            return Err(missing);
        }
        // "2." and ".5" are both valid float syntax.
        let revs_per_second: f64 = std::str::from_utf8(run)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(missing)?;

        // Float-to-int `as` saturates, so absurd speeds pin at u16::MAX.
        Ok(HostCommand::Vibration {
            rpm: (revs_per_second * 60.0) as u16,
        })
    }
}

impl Iterator for CommandScanner<'_> {
    type Item = Result<HostCommand, CommandError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.bytes.len() {
            let offset = self.pos;
            let lead = self.bytes[offset];
            self.pos += 1;
            match lead {
                b'A'..=b'E' => return Some(self.servo(lead, offset)),
                b'F' => return Some(self.vibration(offset)),
                _ => {}
            }
        }
        None
    }
}

/// Render a command line for the device, terminator included.
///
/// Servo degrees are rounded up to the next wire thousandth and vibration to
/// the next thousandth of a revolution, so the device decodes exactly the
/// requested values.
pub fn encode_command(commands: &[HostCommand]) -> String {
    let mut line = String::new();
    for command in commands {
        match *command {
            HostCommand::ServoTarget { finger, degrees } => {
                let degrees = degrees.clamp(0, SERVO_MAX_DEGREES) as u64;
                let max = SERVO_MAX_DEGREES as u64;
                let wire = (degrees * SERVO_WIRE_SCALE).div_ceil(max);
                let _ = write!(line, "{}{}", finger_letter(finger), wire);
            }
            HostCommand::Vibration { rpm } => {
                let milli_revs = (u64::from(rpm) * 1000).div_ceil(60);
                let _ = write!(line, "F{}.{:03}", milli_revs / 1000, milli_revs % 1000);
            }
        }
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo(finger: Finger, degrees: i32) -> Result<HostCommand, CommandError> {
        Ok(HostCommand::ServoTarget { finger, degrees })
    }

    #[test]
    fn telemetry_line_layout() {
        let snap = StateSnapshot {
            finger_angles: [4095, 2048, 0, 17, 300],
            joystick_xy: [512.9, 1024.0],
            buttons_bitmask: 0,
            ..StateSnapshot::default()
        };
        assert_eq!(encode_telemetry(&snap), "A4095B2048C0D17E300F512G1024\n");
    }

    #[test]
    fn telemetry_button_letters_follow_bits() {
        let all = Button::ALL.iter().fold(0, |m, b| m | b.mask());
        let snap = StateSnapshot {
            buttons_bitmask: all,
            ..StateSnapshot::default()
        };
        assert!(encode_telemetry(&snap).ends_with("G0LHJK\n"));

        let snap = StateSnapshot {
            buttons_bitmask: Button::B.mask(),
            ..StateSnapshot::default()
        };
        assert!(encode_telemetry(&snap).ends_with("G0K\n"));
    }

    #[test]
    fn splay_preamble() {
        assert_eq!(
            encode_splay(DEFAULT_SPLAY),
            "(AB)511(BB)511(CB)511(DB)511(EB)511\n"
        );
    }

    #[test]
    fn servo_line_rescales_thousandths() {
        let cmds: Vec<_> = scan_commands(b"A500B1000C0D0E0\n").collect();
        assert_eq!(
            cmds,
            vec![
                servo(Finger::Thumb, 90),
                servo(Finger::Index, 180),
                servo(Finger::Middle, 0),
                servo(Finger::Ring, 0),
                servo(Finger::Pinky, 0),
            ]
        );
    }

    #[test]
    fn servo_values_clamp_to_full_scale() {
        let cmds: Vec<_> = scan_commands(b"C5000").collect();
        assert_eq!(cmds, vec![servo(Finger::Middle, 180)]);
    }

    #[test]
    fn vibration_parses_fraction_and_scales_to_rpm() {
        let cmds: Vec<_> = scan_commands(b"F2.5\n").collect();
        assert_eq!(cmds, vec![Ok(HostCommand::Vibration { rpm: 150 })]);

        let cmds: Vec<_> = scan_commands(b"F3").collect();
        assert_eq!(cmds, vec![Ok(HostCommand::Vibration { rpm: 180 })]);

        let cmds: Vec<_> = scan_commands(b"F2.").collect();
        assert_eq!(cmds, vec![Ok(HostCommand::Vibration { rpm: 120 })]);
    }

    #[test]
    fn vibration_saturates() {
        let cmds: Vec<_> = scan_commands(b"F99999").collect();
        assert_eq!(cmds, vec![Ok(HostCommand::Vibration { rpm: u16::MAX })]);
    }

    #[test]
    fn second_point_ends_the_number() {
        let cmds: Vec<_> = scan_commands(b"F1.5.5A500").collect();
        assert_eq!(
            cmds,
            vec![
                Ok(HostCommand::Vibration { rpm: 90 }),
                servo(Finger::Thumb, 90),
            ]
        );
    }

    #[test]
    fn unknown_bytes_are_skipped() {
        let cmds: Vec<_> = scan_commands(b"  xyz A500 \r\tZ B0\n").collect();
        assert_eq!(cmds, vec![servo(Finger::Thumb, 90), servo(Finger::Index, 0)]);
    }

    #[test]
    fn malformed_tokens_report_errors_without_values() {
        let cmds: Vec<_> = scan_commands(b"AB250F.").collect();
        assert_eq!(
            cmds,
            vec![
                Err(CommandError::MissingValue {
                    letter: 'A',
                    offset: 0
                }),
                servo(Finger::Index, 45),
                Err(CommandError::MissingValue {
                    letter: 'F',
                    offset: 5
                }),
            ]
        );
    }

    #[test]
    fn overflowing_servo_value_is_an_error() {
        let cmds: Vec<_> = scan_commands(b"D99999999999B1000").collect();
        assert_eq!(
            cmds,
            vec![
                Err(CommandError::Overflow {
                    letter: 'D',
                    offset: 0
                }),
                servo(Finger::Index, 180),
            ]
        );
    }

    #[test]
    fn scanning_stops_at_capacity_and_newline() {
        // Only "A50" of the trailing "A500" fits inside the bound.
        let mut long = vec![b' '; COMMAND_LINE_CAPACITY - 3];
        long.extend_from_slice(b"A500");
        let cmds: Vec<_> = scan_commands(&long).collect();
        assert_eq!(cmds, vec![servo(Finger::Thumb, 9)]);

        let cmds: Vec<_> = scan_commands(b"A500\nB500").collect();
        assert_eq!(cmds, vec![servo(Finger::Thumb, 90)]);
    }

    #[test]
    fn encoded_commands_decode_to_the_same_values() {
        let mut wanted: Vec<HostCommand> = Finger::ALL
            .iter()
            .zip([0, 1, 45, 91, 180])
            .map(|(&finger, degrees)| HostCommand::ServoTarget { finger, degrees })
            .collect();
        wanted.push(HostCommand::Vibration { rpm: 150 });

        let line = encode_command(&wanted);
        assert_eq!(line, "A0B6C250D506E1000F2.500\n");
        let decoded: Vec<_> = scan_commands(line.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, wanted);
    }
}
