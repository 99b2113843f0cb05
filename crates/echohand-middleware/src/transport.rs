//! Poll-based byte transports for the host link.
//!
//! The command relay runs on a fixed period and must never stall waiting for
//! input, so every [`Transport::read`] returns `Ok(0)` when no bytes are
//! pending instead of blocking. Three implementations ship here:
//!
//! - [`SerialTransport`] – USB/UART via the `serialport` crate.
//! - [`TcpTransport`] – a plain TCP socket (emulators, remote hosts).
//! - [`LoopbackTransport`] – an in-memory pair used by tests and the simulator.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use echohand_types::EchoError;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

/// How long a serial read may wait before reporting "nothing pending".
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// A duplex byte stream polled by the link workers.
pub trait Transport: Send {
    /// Read whatever is pending into `buf`; `Ok(0)` means "nothing yet".
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EchoError>;

    /// Write the whole of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<(), EchoError>;

    /// Push buffered output to the wire.
    fn flush(&mut self) -> Result<(), EchoError> {
        Ok(())
    }

    /// Short human readable description for logs.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EchoError> {
        (**self).read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), EchoError> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<(), EchoError> {
        (**self).flush()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

fn io_error(context: &str, err: std::io::Error) -> EchoError {
    EchoError::Transport(format!("{context}: {err}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Serial
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParitySetting {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlSetting {
    #[default]
    None,
    Software,
    Hardware,
}

/// Line settings for a serial link. Defaults to 115200 8N1, no flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub data_bits: u8,
    pub parity: ParitySetting,
    pub stop_bits: u8,
    pub flow_control: FlowControlSetting,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: 115_200,
            data_bits: 8,
            parity: ParitySetting::None,
            stop_bits: 1,
            flow_control: FlowControlSetting::None,
        }
    }
}

impl SerialSettings {
    fn data_bits(&self) -> Result<DataBits, EchoError> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(EchoError::Config(format!("unsupported data bits: {other}"))),
        }
    }

    fn stop_bits(&self) -> Result<StopBits, EchoError> {
        match self.stop_bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(EchoError::Config(format!("unsupported stop bits: {other}"))),
        }
    }

    fn parity(&self) -> Parity {
        match self.parity {
            ParitySetting::None => Parity::None,
            ParitySetting::Odd => Parity::Odd,
            ParitySetting::Even => Parity::Even,
        }
    }

    fn flow_control(&self) -> FlowControl {
        match self.flow_control {
            FlowControlSetting::None => FlowControl::None,
            FlowControlSetting::Software => FlowControl::Software,
            FlowControlSetting::Hardware => FlowControl::Hardware,
        }
    }
}

/// Serial port transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open the port described by `settings`.
    pub fn open(settings: &SerialSettings) -> Result<Self, EchoError> {
        if settings.port.is_empty() {
            return Err(EchoError::Config("serial port path is empty".to_string()));
        }
        let port = serialport::new(&settings.port, settings.baud)
            .data_bits(settings.data_bits()?)
            .parity(settings.parity())
            .stop_bits(settings.stop_bits()?)
            .flow_control(settings.flow_control())
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| EchoError::Transport(format!("open {}: {e}", settings.port)))?;

        info!(port = %settings.port, baud = settings.baud, "serial port opened");
        Ok(Self {
            port,
            name: format!("serial:{}@{}", settings.port, settings.baud),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EchoError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| EchoError::Transport(format!("{}: {e}", self.name)))?;
        if pending == 0 {
            return Ok(0);
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(io_error(&self.name, e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), EchoError> {
        self.port.write_all(data).map_err(|e| io_error(&self.name, e))
    }

    fn flush(&mut self) -> Result<(), EchoError> {
        self.port.flush().map_err(|e| io_error(&self.name, e))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TCP
// ────────────────────────────────────────────────────────────────────────────

/// Outbound bytes a TCP link may hold while the peer is not reading.
const TCP_BACKLOG_LIMIT: usize = 64 * 1024;

/// Non-blocking TCP socket transport.
///
/// Writes never wait on the peer. Bytes the socket cannot take yet stay in
/// a bounded backlog that later writes drain first; a frame that would
/// overflow the backlog is dropped whole, so the peer never sees a torn
/// frame.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
    backlog: Vec<u8>,
    dropped_frames: u64,
}

impl TcpTransport {
    /// Connect to a listening host.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, EchoError> {
        let stream = TcpStream::connect(addr).map_err(|e| io_error("tcp connect", e))?;
        Self::from_stream(stream)
    }

    /// Bind `addr`, wait for one peer, and wrap the accepted connection.
    pub fn accept(addr: impl ToSocketAddrs) -> Result<Self, EchoError> {
        let listener = TcpListener::bind(addr).map_err(|e| io_error("tcp bind", e))?;
        if let Ok(local) = listener.local_addr() {
            info!(%local, "waiting for host connection");
        }
        let (stream, _) = listener.accept().map_err(|e| io_error("tcp accept", e))?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, EchoError> {
        stream
            .set_nonblocking(true)
            .map_err(|e| io_error("tcp configure", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| io_error("tcp configure", e))?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        debug!(%peer, "tcp transport ready");
        Ok(Self {
            stream,
            peer: format!("tcp:{peer}"),
            backlog: Vec::new(),
            dropped_frames: 0,
        })
    }

    /// Writes discarded because the peer fell too far behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Bytes accepted but not yet handed to the socket.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Push as much of the backlog as the socket takes right now.
    fn drain_backlog(&mut self) -> Result<(), EchoError> {
        while !self.backlog.is_empty() {
            match self.stream.write(&self.backlog) {
                Ok(0) => {
                    return Err(EchoError::Transport(format!(
                        "{}: connection closed by peer",
                        self.peer
                    )));
                }
                Ok(n) => {
                    self.backlog.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break;
                }
                Err(e) => return Err(io_error(&self.peer, e)),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EchoError> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(EchoError::Transport(format!(
                "{}: connection closed by peer",
                self.peer
            ))),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(io_error(&self.peer, e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), EchoError> {
        self.drain_backlog()?;
        if self.backlog.len() + data.len() > TCP_BACKLOG_LIMIT {
            self.dropped_frames += 1;
            debug!(peer = %self.peer, bytes = data.len(), "peer not reading, frame dropped");
            return Ok(());
        }
        self.backlog.extend_from_slice(data);
        self.drain_backlog()
    }

    fn flush(&mut self) -> Result<(), EchoError> {
        self.drain_backlog()?;
        match self.stream.flush() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => Err(io_error(&self.peer, e)),
            _ => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.peer.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loopback
// ────────────────────────────────────────────────────────────────────────────

type Pipe = Arc<Mutex<VecDeque<u8>>>;

/// One end of an in-memory duplex pipe.
pub struct LoopbackTransport {
    inbound: Pipe,
    outbound: Pipe,
    label: &'static str,
}

impl LoopbackTransport {
    /// Two connected ends: bytes written to one are read from the other.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Pipe::default();
        let b_to_a = Pipe::default();
        (
            Self {
                inbound: Arc::clone(&b_to_a),
                outbound: Arc::clone(&a_to_b),
                label: "loopback:a",
            },
            Self {
                inbound: a_to_b,
                outbound: b_to_a,
                label: "loopback:b",
            },
        )
    }

    /// Bytes waiting to be read on this end.
    pub fn pending(&self) -> usize {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EchoError> {
        let mut queue = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), EchoError> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(data.iter().copied());
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.to_string()
    }
}
