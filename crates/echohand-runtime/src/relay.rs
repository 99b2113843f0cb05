//! [`CommandRelay`] – the glove's half of the host link.
//!
//! Each [`CommandRelay::tick`] drains whatever the [`Transport`] has ready,
//! applies every complete host command to the broker, then sends one
//! telemetry frame if the broker revision moved since the last one. Nothing
//! here blocks: an idle link costs one empty read per tick.
//!
//! Malformed input is dropped where it is found. A bad command token is
//! skipped while the rest of its line still applies; a binary frame that
//! fails its sentinels or length never reaches the broker.

use std::sync::Arc;

use echohand_middleware::{StateBroker, Transport};
use echohand_protocol::{
    COMMAND_LINE_CAPACITY, CommandFrame, FrameAssembler, HostCommand, LineAssembler,
    TelemetryFrame, encode_splay, encode_telemetry, scan_commands, wrap_frame,
};
use echohand_types::{EchoError, FINGER_COUNT, SERVO_MAX_DEGREES, StateSnapshot};
use tracing::{debug, info, trace};

use crate::config::{LinkConfig, WireFormat};

// Upper bound on reads per tick so a flooding host cannot starve telemetry.
const MAX_READS_PER_TICK: usize = 16;
const READ_CHUNK: usize = 256;

/// Inbound and outbound traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub frames_rejected: u64,
    pub telemetry_sent: u64,
}

/// Bridges a host [`Transport`] and the [`StateBroker`].
pub struct CommandRelay<T> {
    transport: T,
    broker: Arc<StateBroker>,
    wire: WireFormat,
    splay: [i32; FINGER_COUNT],
    lines: LineAssembler,
    frames: FrameAssembler,
    last_sent: Option<u32>,
    silent: bool,
    stats: RelayStats,
}

impl<T: Transport> CommandRelay<T> {
    pub fn new(transport: T, broker: Arc<StateBroker>, link: &LinkConfig) -> Self {
        Self {
            transport,
            broker,
            wire: link.wire,
            splay: link.splay,
            lines: LineAssembler::new(COMMAND_LINE_CAPACITY),
            frames: FrameAssembler::new(CommandFrame::SIZE),
            last_sent: None,
            silent: false,
            stats: RelayStats::default(),
        }
    }

    /// Stop all link traffic, e.g. while the debug printer owns the console.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Announce the link. ASCII hosts receive the splay preamble once.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error.
    pub fn start(&mut self) -> Result<(), EchoError> {
        info!(link = %self.transport.describe(), wire = ?self.wire, "host link up");
        if self.silent || self.wire != WireFormat::Ascii {
            return Ok(());
        }
        self.transport.write_all(encode_splay(self.splay).as_bytes())?;
        self.transport.flush()
    }

    /// One relay iteration: inbound, then outbound.
    ///
    /// # Errors
    ///
    /// Returns transport errors only; bad input is dropped silently.
    pub fn tick(&mut self) -> Result<(), EchoError> {
        if self.silent {
            return Ok(());
        }
        self.poll_inbound()?;
        self.push_telemetry()?;
        Ok(())
    }

    /// Drain ready bytes and apply every complete command.
    /// Returns the number of commands applied.
    pub fn poll_inbound(&mut self) -> Result<usize, EchoError> {
        let mut buf = [0u8; READ_CHUNK];
        let mut applied = 0;
        for _ in 0..MAX_READS_PER_TICK {
            let n = self.transport.read(&mut buf)?;
            if n == 0 {
                break;
            }
            trace!(bytes = n, "inbound chunk");
            applied += match self.wire {
                WireFormat::Ascii => self.apply_ascii(&buf[..n]),
                WireFormat::Binary => self.apply_binary(&buf[..n]),
            };
        }
        Ok(applied)
    }

    /// Send a telemetry frame if the broker changed since the last one.
    /// Returns `true` when a frame went out.
    pub fn push_telemetry(&mut self) -> Result<bool, EchoError> {
        let snapshot = match self.last_sent {
            None => self.broker.take_snapshot(),
            Some(seen) => match self.broker.snapshot_if_changed(seen) {
                Some(snapshot) => snapshot,
                None => return Ok(false),
            },
        };
        let bytes = encode_outbound(self.wire, &snapshot);
        self.transport.write_all(&bytes)?;
        self.transport.flush()?;
        self.last_sent = Some(snapshot.revision);
        self.stats.telemetry_sent += 1;
        Ok(true)
    }

    fn apply_ascii(&mut self, chunk: &[u8]) -> usize {
        let mut applied = 0;
        for line in self.lines.feed(chunk) {
            for token in scan_commands(&line) {
                match token {
                    Ok(command) => {
                        apply_command(&self.broker, command);
                        self.stats.commands_applied += 1;
                        applied += 1;
                    }
                    Err(err) => {
                        debug!(error = %err, "command token dropped");
                        self.stats.commands_rejected += 1;
                    }
                }
            }
        }
        applied
    }

    fn apply_binary(&mut self, chunk: &[u8]) -> usize {
        let mut applied = 0;
        for payload in self.frames.feed(chunk) {
            match CommandFrame::decode(&payload) {
                Ok(frame) => {
                    self.broker.batch(|w| {
                        for i in 0..FINGER_COUNT {
                            w.set_vibration_rpm(i, frame.vibration_rpms[i]);
                            let degrees = frame.servo_target_angles[i].clamp(0, SERVO_MAX_DEGREES);
                            w.set_servo_target_angle(i, degrees);
                        }
                    });
                    self.stats.commands_applied += 1;
                    applied += 1;
                }
                Err(err) => {
                    debug!(error = %err, "command frame dropped");
                    self.stats.frames_rejected += 1;
                }
            }
        }
        applied
    }
}

/// Write one decoded host command into the broker.
pub fn apply_command(broker: &StateBroker, command: HostCommand) {
    match command {
        HostCommand::ServoTarget { finger, degrees } => {
            broker.set_servo_target_angle(finger.index(), degrees);
        }
        HostCommand::Vibration { rpm } => broker.batch(|w| {
            for i in 0..FINGER_COUNT {
                w.set_vibration_rpm(i, rpm);
            }
        }),
    }
}

/// Telemetry bytes for `snapshot` in the given wire format.
pub fn encode_outbound(wire: WireFormat, snapshot: &StateSnapshot) -> Vec<u8> {
    match wire {
        WireFormat::Ascii => encode_telemetry(snapshot).into_bytes(),
        WireFormat::Binary => wrap_frame(&TelemetryFrame::from_snapshot(snapshot).encode()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echohand_middleware::LoopbackTransport;
    use echohand_protocol::{START_SENTINEL, unwrap_frame};

    fn relay(
        wire: WireFormat,
    ) -> (CommandRelay<LoopbackTransport>, LoopbackTransport, Arc<StateBroker>) {
        let (device, host) = LoopbackTransport::pair();
        let broker = Arc::new(StateBroker::new());
        let link = LinkConfig {
            wire,
            ..LinkConfig::default()
        };
        (CommandRelay::new(device, Arc::clone(&broker), &link), host, broker)
    }

    fn drain(host: &mut LoopbackTransport) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = host.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn ascii_start_sends_splay_preamble() {
        let (mut relay, mut host, _) = relay(WireFormat::Ascii);
        relay.start().unwrap();
        assert_eq!(
            String::from_utf8(drain(&mut host)).unwrap(),
            "(AB)511(BB)511(CB)511(DB)511(EB)511\n"
        );
    }

    #[test]
    fn binary_start_sends_nothing() {
        let (mut relay, mut host, _) = relay(WireFormat::Binary);
        relay.start().unwrap();
        assert!(drain(&mut host).is_empty());
    }

    #[test]
    fn servo_line_sets_targets() {
        let (mut relay, mut host, broker) = relay(WireFormat::Ascii);
        host.write_all(b"A500B1000C0D0E0\n").unwrap();

        assert_eq!(relay.poll_inbound().unwrap(), 5);
        let snap = broker.take_snapshot();
        assert_eq!(snap.servo_target_angles, [90, 180, 0, 0, 0]);
    }

    #[test]
    fn vibration_applies_to_every_motor() {
        let (mut relay, mut host, broker) = relay(WireFormat::Ascii);
        host.write_all(b"F2.5\n").unwrap();
        relay.poll_inbound().unwrap();
        assert_eq!(broker.take_snapshot().vibration_rpms, [150; FINGER_COUNT]);
    }

    #[test]
    fn split_line_waits_for_terminator() {
        let (mut relay, mut host, broker) = relay(WireFormat::Ascii);
        host.write_all(b"A10").unwrap();
        assert_eq!(relay.poll_inbound().unwrap(), 0);
        assert_eq!(broker.revision(), 0);

        host.write_all(b"00\n").unwrap();
        assert_eq!(relay.poll_inbound().unwrap(), 1);
        assert_eq!(broker.servo_target_angle(0), 180);
    }

    #[test]
    fn bad_token_is_counted_and_the_rest_applies() {
        let (mut relay, mut host, broker) = relay(WireFormat::Ascii);
        host.write_all(b"AB1000\n").unwrap();
        relay.poll_inbound().unwrap();

        assert_eq!(broker.servo_target_angle(0), 0);
        assert_eq!(broker.servo_target_angle(1), 180);
        let stats = relay.stats();
        assert_eq!(stats.commands_applied, 1);
        assert_eq!(stats.commands_rejected, 1);
    }

    #[test]
    fn telemetry_only_goes_out_on_change() {
        let (mut relay, mut host, broker) = relay(WireFormat::Ascii);

        assert!(relay.push_telemetry().unwrap());
        assert_eq!(
            String::from_utf8(drain(&mut host)).unwrap(),
            "A0B0C0D0E0F0G0\n"
        );
        assert!(!relay.push_telemetry().unwrap());

        broker.set_finger_angle(2, 4095);
        assert!(relay.push_telemetry().unwrap());
        assert!(String::from_utf8(drain(&mut host)).unwrap().contains("C4095"));
        assert_eq!(relay.stats().telemetry_sent, 2);
    }

    #[test]
    fn binary_frames_roundtrip_through_the_link() {
        let (mut relay, mut host, broker) = relay(WireFormat::Binary);
        let command = CommandFrame {
            vibration_rpms: [10, 20, 30, 40, 50],
            servo_target_angles: [1, 2, 3, 4, 5],
        };
        let mut stream = vec![0xAA, 0x07];
        stream.extend(wrap_frame(&command.encode()));
        host.write_all(&stream).unwrap();

        relay.tick().unwrap();
        let snap = broker.take_snapshot();
        assert_eq!(snap.vibration_rpms, [10, 20, 30, 40, 50]);
        assert_eq!(snap.servo_target_angles, [1, 2, 3, 4, 5]);

        let sent = drain(&mut host);
        assert_eq!(sent[0], START_SENTINEL);
        let telemetry = TelemetryFrame::decode(unwrap_frame(&sent).unwrap()).unwrap();
        assert_eq!(telemetry.battery_percent, 100);
    }

    #[test]
    fn binary_servo_targets_are_clamped() {
        let (mut relay, mut host, broker) = relay(WireFormat::Binary);
        let command = CommandFrame {
            vibration_rpms: [0; FINGER_COUNT],
            servo_target_angles: [5000, -90, 0, 180, 181],
        };
        host.write_all(&wrap_frame(&command.encode())).unwrap();

        assert_eq!(relay.poll_inbound().unwrap(), 1);
        assert_eq!(
            broker.take_snapshot().servo_target_angles,
            [SERVO_MAX_DEGREES, 0, 0, 180, SERVO_MAX_DEGREES]
        );
    }

    #[test]
    fn short_binary_frame_changes_nothing() {
        let (mut relay, mut host, broker) = relay(WireFormat::Binary);
        let mut framed = vec![START_SENTINEL];
        framed.extend_from_slice(&[9u8; 12]);
        framed.push(0x07);
        host.write_all(&framed).unwrap();

        assert_eq!(relay.poll_inbound().unwrap(), 0);
        assert_eq!(broker.revision(), 0);
    }

    #[test]
    fn silent_relay_neither_reads_nor_writes() {
        let (relay, mut host, broker) = relay(WireFormat::Ascii);
        let mut relay = relay.with_silent(true);
        host.write_all(b"A1000\n").unwrap();

        relay.start().unwrap();
        relay.tick().unwrap();
        assert_eq!(broker.revision(), 0);
        assert!(drain(&mut host).is_empty());
        assert_eq!(relay.transport().pending(), 6);
    }
}
