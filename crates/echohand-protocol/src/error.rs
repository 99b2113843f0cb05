use thiserror::Error;

/// Reasons a packed binary frame is rejected.
///
/// A rejected frame is dropped whole; no field of it is ever applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Short Frame: expected {expected} bytes, got {actual}")]
    Short { expected: usize, actual: usize },

    #[error("Sentinel Mismatch: start {start:#04x}, end {end:#04x}")]
    Sentinel { start: u8, end: u8 },
}

/// A single malformed token inside a host command line.
///
/// The scanner reports the error and carries on with the next token, so one
/// bad value never discards the rest of the line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command '{letter}' at byte {offset} has no value")]
    MissingValue { letter: char, offset: usize },

    #[error("Command '{letter}' at byte {offset} overflows")]
    Overflow { letter: char, offset: usize },
}
