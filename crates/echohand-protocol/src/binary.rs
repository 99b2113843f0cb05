//! Packed binary frames for byte-oriented serial links.
//!
//! All fields are little-endian with no padding:
//!
//! | Frame | Layout | Size |
//! |---|---|---|
//! | [`TelemetryFrame`] | 5 × i32 finger, 2 × i32 joystick, u32 buttons, u8 battery | 33 |
//! | [`CommandFrame`] | 5 × u16 vibration RPM, 5 × i32 servo degrees | 30 |
//!
//! On a stream link each payload is wrapped as
//! `START_SENTINEL, payload.., END_SENTINEL` (see [`wrap_frame`] and
//! [`crate::FrameAssembler`]).

use echohand_types::{FINGER_COUNT, StateSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

pub const START_SENTINEL: u8 = 0x06;
pub const END_SENTINEL: u8 = 0x07;

/// Device → host state frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub finger_angles: [i32; FINGER_COUNT],
    pub joystick_xy: [i32; 2],
    pub buttons_bitmask: u32,
    pub battery_percent: u8,
}

impl TelemetryFrame {
    pub const SIZE: usize = FINGER_COUNT * 4 + 2 * 4 + 4 + 1;

    /// Joystick axes are truncated to whole numbers.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        Self {
            finger_angles: snapshot.finger_angles,
            joystick_xy: snapshot.joystick_xy.map(|v| v as i32),
            buttons_bitmask: snapshot.buttons_bitmask,
            battery_percent: snapshot.battery_percent,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer::new(&mut out);
        for angle in self.finger_angles {
            w.put(&angle.to_le_bytes());
        }
        for axis in self.joystick_xy {
            w.put(&axis.to_le_bytes());
        }
        w.put(&self.buttons_bitmask.to_le_bytes());
        w.put(&[self.battery_percent]);
        out
    }

    /// Decode from the first [`Self::SIZE`] bytes; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut r = Reader::new(bytes, Self::SIZE)?;
        Ok(Self {
            finger_angles: std::array::from_fn(|_| r.i32()),
            joystick_xy: [r.i32(), r.i32()],
            buttons_bitmask: r.u32(),
            battery_percent: r.u8(),
        })
    }
}

/// Host → device actuator frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub vibration_rpms: [u16; FINGER_COUNT],
    pub servo_target_angles: [i32; FINGER_COUNT],
}

impl CommandFrame {
    pub const SIZE: usize = FINGER_COUNT * 2 + FINGER_COUNT * 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer::new(&mut out);
        for rpm in self.vibration_rpms {
            w.put(&rpm.to_le_bytes());
        }
        for angle in self.servo_target_angles {
            w.put(&angle.to_le_bytes());
        }
        out
    }

    /// Decode from the first [`Self::SIZE`] bytes; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut r = Reader::new(bytes, Self::SIZE)?;
        Ok(Self {
            vibration_rpms: std::array::from_fn(|_| r.u16()),
            servo_target_angles: std::array::from_fn(|_| r.i32()),
        })
    }
}

/// Surround `payload` with the start and end sentinels.
pub fn wrap_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.push(START_SENTINEL);
    framed.extend_from_slice(payload);
    framed.push(END_SENTINEL);
    framed
}

/// Strip and check the sentinels of a complete framed buffer.
pub fn unwrap_frame(framed: &[u8]) -> Result<&[u8], FrameError> {
    match framed {
        [START_SENTINEL, payload @ .., END_SENTINEL] => Ok(payload),
        [start, .., end] => Err(FrameError::Sentinel {
            start: *start,
            end: *end,
        }),
        _ => Err(FrameError::Short {
            expected: 2,
            actual: framed.len(),
        }),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal cursors
// ────────────────────────────────────────────────────────────────────────────

struct Writer<'a> {
    out: &'a mut [u8],
    at: usize,
}

impl<'a> Writer<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self { out, at: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.out[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }
}

// Length is checked once up front, so the typed reads below stay in bounds.
struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], size: usize) -> Result<Self, FrameError> {
        if bytes.len() < size {
            return Err(FrameError::Short {
                expected: size,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: &bytes[..size],
            at: 0,
        })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut raw = [0u8; N];
        raw.copy_from_slice(&self.bytes[self.at..self.at + N]);
        self.at += N;
        raw
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_telemetry() -> TelemetryFrame {
        TelemetryFrame {
            finger_angles: [0, 1024, 2048, 3072, 4095],
            joystick_xy: [512, -1],
            buttons_bitmask: 0b1001,
            battery_percent: 87,
        }
    }

    #[test]
    fn sizes_match_packed_layout() {
        assert_eq!(TelemetryFrame::SIZE, 33);
        assert_eq!(CommandFrame::SIZE, 30);
    }

    #[test]
    fn telemetry_layout_is_little_endian() {
        let bytes = sample_telemetry().encode();
        assert_eq!(&bytes[4..8], &[0x00, 0x04, 0x00, 0x00]);
        assert_eq!(&bytes[24..28], &[0xff; 4]);
        assert_eq!(&bytes[28..32], &[0x09, 0, 0, 0]);
        assert_eq!(bytes[32], 87);
        assert_eq!(TelemetryFrame::decode(&bytes), Ok(sample_telemetry()));
    }

    #[test]
    fn from_snapshot_truncates_joystick() {
        let snap = StateSnapshot {
            joystick_xy: [511.7, 3.2],
            battery_percent: 55,
            ..StateSnapshot::default()
        };
        let frame = TelemetryFrame::from_snapshot(&snap);
        assert_eq!(frame.joystick_xy, [511, 3]);
        assert_eq!(frame.battery_percent, 55);
    }

    #[test]
    fn command_frame_decodes_fields_in_order() {
        let frame = CommandFrame {
            vibration_rpms: [60, 120, 180, 240, 300],
            servo_target_angles: [0, 45, 90, 135, 180],
        };
        let bytes = frame.encode();
        assert_eq!(&bytes[0..2], &60u16.to_le_bytes());
        assert_eq!(&bytes[10..14], &0i32.to_le_bytes());
        assert_eq!(&bytes[26..30], &180i32.to_le_bytes());
        assert_eq!(CommandFrame::decode(&bytes), Ok(frame));
    }

    #[test]
    fn short_frames_are_rejected() {
        let bytes = CommandFrame::default().encode();
        assert_eq!(
            CommandFrame::decode(&bytes[..29]),
            Err(FrameError::Short {
                expected: 30,
                actual: 29
            })
        );
        assert!(TelemetryFrame::decode(&[]).is_err());
    }

    #[test]
    fn longer_input_decodes_the_prefix() {
        let mut bytes = sample_telemetry().encode().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(TelemetryFrame::decode(&bytes), Ok(sample_telemetry()));
    }

    #[test]
    fn sentinels_wrap_and_unwrap() {
        let payload = CommandFrame::default().encode();
        let framed = wrap_frame(&payload);
        assert_eq!(framed.len(), CommandFrame::SIZE + 2);
        assert_eq!(unwrap_frame(&framed), Ok(&payload[..]));
    }

    #[test]
    fn sentinel_mismatch_is_rejected() {
        let mut framed = wrap_frame(&[1, 2, 3]);
        let last = framed.len() - 1;
        framed[last] = 0x00;
        assert_eq!(
            unwrap_frame(&framed),
            Err(FrameError::Sentinel {
                start: START_SENTINEL,
                end: 0x00
            })
        );
        assert!(matches!(unwrap_frame(&[START_SENTINEL]), Err(FrameError::Short { .. })));
    }
}
