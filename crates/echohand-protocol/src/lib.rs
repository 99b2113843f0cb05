//! `echohand-protocol` – Wire codecs between the glove and its host.
//!
//! Everything here is a pure function or a small stateful assembler over
//! byte slices; nothing touches the state broker or a transport directly.
//!
//! # Modules
//!
//! - [`ascii`] – OpenGloves-compatible telemetry lines, the splay preamble,
//!   and the bounded host command scanner ([`CommandScanner`]).
//! - [`binary`] – packed little-endian [`TelemetryFrame`] / [`CommandFrame`]
//!   with optional start/end sentinels.
//! - [`framing`] – [`LineAssembler`] and [`FrameAssembler`]: turn a raw byte
//!   stream into complete frames.
//! - [`host`] – [`HostGloveState`]: the receiving side's decoder for
//!   telemetry lines.
//! - [`error`] – [`FrameError`] and [`CommandError`].

pub mod ascii;
pub mod binary;
pub mod error;
pub mod framing;
pub mod host;

pub use ascii::{
    COMMAND_LINE_CAPACITY, CommandScanner, DEFAULT_SPLAY, HostCommand, encode_command,
    encode_splay, encode_telemetry, scan_commands,
};
pub use binary::{
    CommandFrame, END_SENTINEL, START_SENTINEL, TelemetryFrame, unwrap_frame, wrap_frame,
};
pub use error::{CommandError, FrameError};
pub use framing::{FrameAssembler, LineAssembler};
pub use host::HostGloveState;
