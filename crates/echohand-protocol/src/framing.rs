//! Stream framing: raw transport bytes in, complete frames out.

use tracing::trace;

use crate::binary::{END_SENTINEL, START_SENTINEL};

/// Collects bytes into newline-terminated lines of bounded length.
///
/// A line is emitted when `\n` arrives or when `capacity` bytes have
/// accumulated without one, whichever comes first. A trailing `\r` is
/// stripped and empty lines are dropped.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    capacity: usize,
}

impl LineAssembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Feed one byte; returns a completed line, if any.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == b'\n' {
            return self.finish();
        }
        self.buf.push(byte);
        if self.buf.len() >= self.capacity {
            trace!(capacity = self.capacity, "line hit capacity without terminator");
            return self.finish();
        }
        None
    }

    /// Feed a chunk; returns every line it completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Bytes held for the line in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        if self.buf.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }
}

/// Extracts sentinel-wrapped fixed-size payloads from a byte stream.
///
/// Bytes before a start sentinel are discarded. When the byte where the end
/// sentinel should be is anything else, the candidate start is dropped and
/// the search resumes one byte later, so a stray `0x06` inside noise costs at
/// most one frame.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    payload_len: usize,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new(payload_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(payload_len + 2),
            payload_len,
            discarded: 0,
        }
    }

    /// Feed a chunk; returns every complete payload it finished.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let framed_len = self.payload_len + 2;
        let mut frames = Vec::new();

        loop {
            match self.buf.iter().position(|&b| b == START_SENTINEL) {
                Some(0) => {}
                Some(skip) => {
                    self.discard(skip);
                }
                None => {
                    let all = self.buf.len();
                    self.discard(all);
                    break;
                }
            }
            if self.buf.len() < framed_len {
                break;
            }
            if self.buf[framed_len - 1] == END_SENTINEL {
                frames.push(self.buf[1..=self.payload_len].to_vec());
                self.buf.drain(..framed_len);
            } else {
                trace!("end sentinel mismatch, resynchronising");
                self.discard(1);
            }
        }
        frames
    }

    /// Total bytes thrown away while hunting for frame boundaries.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self, n: usize) {
        self.buf.drain(..n);
        self.discarded += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{CommandFrame, wrap_frame};

    #[test]
    fn lines_split_on_newline_across_chunks() {
        let mut lines = LineAssembler::new(56);
        assert!(lines.feed(b"A500B").is_empty());
        assert_eq!(lines.pending(), 5);
        let out = lines.feed(b"1000\r\nC0\n\n");
        assert_eq!(out, vec![b"A500B1000".to_vec(), b"C0".to_vec()]);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn lines_emit_at_capacity() {
        let mut lines = LineAssembler::new(4);
        let out = lines.feed(b"ABCDEF\n");
        assert_eq!(out, vec![b"ABCD".to_vec(), b"EF".to_vec()]);
    }

    #[test]
    fn frames_survive_leading_noise_and_split_chunks() {
        let payload = CommandFrame {
            vibration_rpms: [1, 2, 3, 4, 5],
            servo_target_angles: [10, 20, 30, 40, 50],
        }
        .encode();
        let framed = wrap_frame(&payload);

        let mut assembler = FrameAssembler::new(CommandFrame::SIZE);
        let (head, tail) = framed.split_at(7);
        let mut first = vec![0xAA, 0xBB];
        first.extend_from_slice(head);

        assert!(assembler.feed(&first).is_empty());
        let frames = assembler.feed(tail);
        assert_eq!(frames, vec![payload.to_vec()]);
        assert_eq!(assembler.discarded(), 2);
    }

    #[test]
    fn bad_end_sentinel_drops_the_candidate() {
        let payload = [9u8; 3];
        let mut stream = vec![START_SENTINEL, 1, 2, 3, 0x00];
        stream.extend_from_slice(&wrap_frame(&payload));

        let mut assembler = FrameAssembler::new(3);
        let frames = assembler.feed(&stream);
        assert_eq!(frames, vec![payload.to_vec()]);
        assert_eq!(assembler.discarded(), 5);
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = wrap_frame(&[1, 1]);
        stream.extend_from_slice(&wrap_frame(&[2, 2]));
        let mut assembler = FrameAssembler::new(2);
        assert_eq!(assembler.feed(&stream), vec![vec![1, 1], vec![2, 2]]);
        assert_eq!(assembler.discarded(), 0);
    }
}
