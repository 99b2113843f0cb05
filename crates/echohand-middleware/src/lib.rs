//! `echohand-middleware` – The Nervous System
//!
//! Moves glove state between the sampling, actuation and link workers
//! without caring about what the values mean.
//!
//! # Modules
//!
//! - [`broker`] – [`StateBroker`]: the single shared state store. Every
//!   worker holds an `Arc` to the same broker and reads or writes individual
//!   fields; a monotonic revision counter lets consumers skip unchanged state.
//! - [`transport`] – [`Transport`]: poll-based byte streams (serial port, TCP
//!   socket, in-memory loopback) that the command relay reads from and writes
//!   to without ever blocking on an empty line.

pub mod broker;
pub mod transport;

pub use broker::{StateBroker, StateWriter};
pub use transport::{
    FlowControlSetting, LoopbackTransport, ParitySetting, SerialSettings, SerialTransport,
    TcpTransport, Transport,
};
