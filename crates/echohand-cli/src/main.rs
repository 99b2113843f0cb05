//! `echohand` – EchoHand Command Line Interface
//!
//! One binary for both ends of the glove link:
//!
//! - `simulate` runs the full device pipeline on a simulated glove and serves
//!   its telemetry to one TCP client or over a serial port.
//! - `monitor` connects as the host and prints decoded telemetry, as text or
//!   as JSON lines.
//! - `send` encodes one servo/vibration command and writes it to the device.
//! - `config` shows or initialises `~/.echohand/config.toml`.
//!
//! Ctrl-C stops the running command gracefully; a second Ctrl-C exits
//! immediately. The process exits non-zero when the link cannot be opened.

mod config;

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use echohand_hal::{HapticBank, Servo, SimGlove, SimGloveHandle, SimMotor, SimServo, VibrationMotor};
use echohand_middleware::{
    FlowControlSetting, ParitySetting, SerialTransport, TcpTransport, Transport,
};
use echohand_protocol::{
    CommandFrame, FrameAssembler, HostCommand, HostGloveState, LineAssembler, TelemetryFrame,
    encode_command, wrap_frame,
};
use echohand_runtime::config::{GloveConfig, LinkKind, WireFormat};
use echohand_runtime::{DebugStyle, GloveRuntime, init_tracing};
use echohand_types::{Button, FINGER_COUNT, Finger, SERVO_MAX_DEGREES};

/// Longest telemetry line the monitor buffers before forcing a break.
const MONITOR_LINE_CAPACITY: usize = 512;
const IDLE_POLL: Duration = Duration::from_millis(2);

// ─────────────────────────────────────────────────────────────────────────────
// Command line
// ─────────────────────────────────────────────────────────────────────────────

/// EchoHand – haptic glove runtime and host tools
#[derive(Parser, Debug)]
#[command(name = "echohand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Haptic glove runtime and host tools", long_about = None)]
struct Args {
    /// Config file to use instead of ~/.echohand/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the device pipeline on a simulated glove
    Simulate {
        #[command(flatten)]
        link: LinkArgs,

        /// Print the glove state instead of talking to a host
        #[arg(long, value_enum, value_name = "STYLE")]
        debug: Option<DebugArg>,

        /// Noise seed; 0 picks a random one
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Skip the open/closed hand windows and use the factory range
        #[arg(long)]
        no_calibration: bool,

        /// Hold the simulated hand still instead of waving it
        #[arg(long)]
        still: bool,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Connect to a glove and print its telemetry
    Monitor {
        #[command(flatten)]
        link: LinkArgs,

        /// One JSON object per frame
        #[arg(long)]
        json: bool,

        /// Stop after this many frames
        #[arg(long, value_name = "N")]
        count: Option<u64>,
    },

    /// Send one servo/vibration command to a glove
    Send {
        #[command(flatten)]
        link: LinkArgs,

        /// Servo target, e.g. `index=90` (repeatable)
        #[arg(long = "servo", value_name = "FINGER=DEG", value_parser = parse_servo)]
        servos: Vec<(Finger, i32)>,

        /// Vibration speed for every motor in revolutions per second
        #[arg(long, value_name = "REV_PER_S")]
        vibration: Option<f64>,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

/// Connection flags shared by every link-using command.
#[derive(ClapArgs, Debug, Clone, Default)]
struct LinkArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(long, value_name = "PORT", conflicts_with = "tcp")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    #[arg(long, value_enum)]
    parity: Option<ParityArg>,

    #[arg(long, value_name = "BITS")]
    data_bits: Option<u8>,

    #[arg(long, value_name = "BITS")]
    stop_bits: Option<u8>,

    #[arg(long, value_enum)]
    flow_control: Option<FlowArg>,

    /// TCP address: listen address for `simulate`, device address otherwise
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,

    /// Use the packed binary wire format
    #[arg(long)]
    binary: bool,
}

impl LinkArgs {
    /// Layer the flags over the file/environment configuration.
    fn apply(&self, cfg: &mut GloveConfig) {
        let link = &mut cfg.link;
        if let Some(port) = &self.serial {
            link.kind = LinkKind::Serial;
            link.serial.port = port.clone();
        }
        if let Some(addr) = &self.tcp {
            link.kind = LinkKind::Tcp;
            link.tcp_addr = addr.clone();
        }
        if let Some(baud) = self.baud {
            link.serial.baud = baud;
        }
        if let Some(parity) = self.parity {
            link.serial.parity = parity.into();
        }
        if let Some(bits) = self.data_bits {
            link.serial.data_bits = bits;
        }
        if let Some(bits) = self.stop_bits {
            link.serial.stop_bits = bits;
        }
        if let Some(flow) = self.flow_control {
            link.serial.flow_control = flow.into();
        }
        if self.binary {
            link.wire = WireFormat::Binary;
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for ParitySetting {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => ParitySetting::None,
            ParityArg::Odd => ParitySetting::Odd,
            ParityArg::Even => ParitySetting::Even,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FlowArg {
    None,
    Software,
    Hardware,
}

impl From<FlowArg> for FlowControlSetting {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::None => FlowControlSetting::None,
            FlowArg::Software => FlowControlSetting::Software,
            FlowArg::Hardware => FlowControlSetting::Hardware,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DebugArg {
    Report,
    Plotter,
    Json,
}

impl From<DebugArg> for DebugStyle {
    fn from(arg: DebugArg) -> Self {
        match arg {
            DebugArg::Report => DebugStyle::Report,
            DebugArg::Plotter => DebugStyle::Plotter,
            DebugArg::Json => DebugStyle::Json,
        }
    }
}

/// Parse `finger=degrees`. Fingers may be named or given as wire letters.
fn parse_servo(s: &str) -> Result<(Finger, i32), String> {
    let (name, degrees) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FINGER=DEG, got `{s}`"))?;
    let finger = match name.trim().to_ascii_lowercase().as_str() {
        "thumb" | "a" => Finger::Thumb,
        "index" | "b" => Finger::Index,
        "middle" | "c" => Finger::Middle,
        "ring" | "d" => Finger::Ring,
        "pinky" | "pinkie" | "e" => Finger::Pinky,
        other => return Err(format!("unknown finger `{other}`")),
    };
    let degrees: i32 = degrees
        .trim()
        .parse()
        .map_err(|_| format!("invalid degrees `{degrees}`"))?;
    if !(0..=SERVO_MAX_DEGREES).contains(&degrees) {
        return Err(format!("degrees must be within 0..={SERVO_MAX_DEGREES}"));
    }
    Ok((finger, degrees))
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures and exit codes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Failure {
    /// Bad flags or configuration.
    Usage(String),
    /// The link could not be opened or broke.
    Connection(String),
    /// The runtime failed to start or stop.
    Runtime(String),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Failure::Usage(_) => ExitCode::from(2),
            Failure::Connection(_) => ExitCode::from(3),
            Failure::Runtime(_) => ExitCode::FAILURE,
        }
    }

    fn message(&self) -> &str {
        match self {
            Failure::Usage(m) | Failure::Connection(m) | Failure::Runtime(m) => m,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG / ECHOHAND_LOG_FORMAT / OTEL_EXPORTER_OTLP_ENDPOINT apply.
    let _tracing = init_tracing("echohand");
    let shutdown = install_ctrlc_handler();

    let result = match args.command {
        Commands::Config { action } => run_config(action, args.config),
        command => config::resolve(args.config.as_deref())
            .map_err(Failure::Usage)
            .and_then(|cfg| run_link_command(command, cfg, &shutdown)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("{}: {}", "error".red().bold(), failure.message());
            failure.exit_code()
        }
    }
}

fn run_link_command(
    command: Commands,
    mut cfg: GloveConfig,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), Failure> {
    match command {
        Commands::Simulate {
            link,
            debug,
            seed,
            no_calibration,
            still,
            duration,
        } => {
            link.apply(&mut cfg);
            if let Some(style) = debug {
                cfg.debug.enabled = true;
                cfg.debug.style = style.into();
            }
            if no_calibration {
                cfg.calibration.enabled = false;
            }
            let opts = SimOptions {
                seed,
                animate: !still,
                duration: duration.map(Duration::from_secs),
            };
            run_simulate(cfg, opts, shutdown)
        }
        Commands::Monitor { link, json, count } => {
            link.apply(&mut cfg);
            run_monitor(&cfg, json, count, shutdown)
        }
        Commands::Send {
            link,
            servos,
            vibration,
        } => {
            link.apply(&mut cfg);
            run_send(&cfg, &servos, vibration)
        }
        Commands::Config { action } => run_config(action, None),
    }
}

/// First Ctrl-C raises the flag; a second one exits at once.
fn install_ctrlc_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            eprintln!("{}", "  Forced exit.".red());
            std::process::exit(130);
        }
        eprintln!();
        eprintln!(
            "{}",
            "⚠  Ctrl-C received, shutting down (press again to force) …"
                .yellow()
                .bold()
        );
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will terminate abruptly");
    }
    shutdown
}

// ─────────────────────────────────────────────────────────────────────────────
// Links
// ─────────────────────────────────────────────────────────────────────────────

/// Host side: dial the device.
fn open_host_link(cfg: &GloveConfig) -> Result<Box<dyn Transport>, Failure> {
    let link: Box<dyn Transport> = match cfg.link.kind {
        LinkKind::Serial => Box::new(
            SerialTransport::open(&cfg.link.serial)
                .map_err(|e| Failure::Connection(e.to_string()))?,
        ),
        LinkKind::Tcp => Box::new(
            TcpTransport::connect(cfg.link.tcp_addr.as_str())
                .map_err(|e| Failure::Connection(e.to_string()))?,
        ),
    };
    eprintln!("  {} {}", "connected".green(), link.describe().bold());
    Ok(link)
}

/// Device side: open the port, or wait for one host on the listen address.
fn open_device_link(cfg: &GloveConfig) -> Result<Box<dyn Transport>, Failure> {
    match cfg.link.kind {
        LinkKind::Serial => {
            let link = SerialTransport::open(&cfg.link.serial)
                .map_err(|e| Failure::Connection(e.to_string()))?;
            Ok(Box::new(link))
        }
        LinkKind::Tcp => {
            eprintln!(
                "  Waiting for a host on {} …",
                cfg.link.tcp_addr.as_str().bold()
            );
            let link = TcpTransport::accept(cfg.link.tcp_addr.as_str())
                .map_err(|e| Failure::Connection(e.to_string()))?;
            eprintln!("  {} {}", "host connected".green(), link.describe().bold());
            Ok(Box::new(link))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// simulate
// ─────────────────────────────────────────────────────────────────────────────

struct SimOptions {
    seed: u64,
    animate: bool,
    duration: Option<Duration>,
}

fn run_simulate(
    cfg: GloveConfig,
    opts: SimOptions,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), Failure> {
    print_banner();
    let link = open_device_link(&cfg)?;

    // Build the Tokio runtime only after tracing is up (see telemetry).
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Failure::Runtime(format!("failed to start async runtime: {e}")))?;
    rt.block_on(simulate(cfg, link, opts, Arc::clone(shutdown)))
}

async fn simulate(
    cfg: GloveConfig,
    link: Box<dyn Transport>,
    opts: SimOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<(), Failure> {
    let glove = SimGlove::builder().seed(opts.seed).build();
    let pose = glove.handle();
    let bank = sim_bank().map_err(|e| Failure::Runtime(e.to_string()))?;

    let runtime = GloveRuntime::launch(&cfg, glove, bank, link, std::io::stdout())
        .map_err(|e| Failure::Runtime(e.to_string()))?;
    let started = Instant::now();
    let expired = |now: Instant| opts.duration.is_some_and(|d| now.duration_since(started) >= d);

    if cfg.calibration.enabled {
        eprintln!(
            "  Calibrating: open hand, then fist ({} ms each) …",
            cfg.calibration.window_ms
        );
    }
    tokio::select! {
        ranges = runtime.calibrated() => {
            if let Some(ranges) = ranges {
                info!(?ranges, "simulated glove calibrated");
                eprintln!("  {} streaming", "✓".green().bold());
            }
        }
        _ = wait_for_flag(&shutdown) => {}
    }

    while !shutdown.load(Ordering::SeqCst) && !expired(Instant::now()) {
        if opts.animate {
            wave(&pose, started.elapsed());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    runtime
        .shutdown()
        .await
        .map_err(|e| Failure::Runtime(e.to_string()))?;
    eprintln!("  {}", "✓ Simulation stopped.".green());
    Ok(())
}

fn sim_bank() -> Result<HapticBank, echohand_types::EchoError> {
    HapticBank::new(
        SimServo::set_of_five()
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Servo>)
            .collect(),
        SimMotor::set_of_five()
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn VibrationMotor>)
            .collect(),
    )
}

/// Slow rolling fist with the joystick circling its centre.
fn wave(pose: &SimGloveHandle, elapsed: Duration) {
    let (curls, (x, y)) = wave_pose(elapsed);
    for finger in Finger::ALL {
        pose.set_curl(finger, curls[finger.index()]);
    }
    pose.set_joystick(x, y);
}

/// Finger curls (`0..=1`) and joystick ADC counts at `elapsed`.
fn wave_pose(elapsed: Duration) -> ([f32; FINGER_COUNT], (u16, u16)) {
    const PERIOD_S: f32 = 4.0;
    let phase = elapsed.as_secs_f32() / PERIOD_S;
    let curls = Finger::ALL.map(|finger| {
        let offset = finger.index() as f32 * 0.08;
        0.5 - 0.5 * (TAU * (phase + offset)).cos()
    });
    let angle = TAU * phase;
    let x = 2048.0 + 1500.0 * angle.cos();
    let y = 2048.0 + 1500.0 * angle.sin();
    (curls, (x.round() as u16, y.round() as u16))
}

async fn wait_for_flag(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// monitor
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MonitorRecord<'a, T: Serialize> {
    received_at: String,
    #[serde(flatten)]
    frame: &'a T,
}

fn run_monitor(
    cfg: &GloveConfig,
    json: bool,
    count: Option<u64>,
    shutdown: &AtomicBool,
) -> Result<(), Failure> {
    let mut link = open_host_link(cfg)?;
    let mut lines = LineAssembler::new(MONITOR_LINE_CAPACITY);
    let mut frames = FrameAssembler::new(TelemetryFrame::SIZE);
    let mut glove = HostGloveState::default();
    let mut buf = [0u8; 1024];
    let mut shown = 0u64;

    while !shutdown.load(Ordering::SeqCst) && count.is_none_or(|limit| shown < limit) {
        let n = link
            .read(&mut buf)
            .map_err(|e| Failure::Connection(e.to_string()))?;
        if n == 0 {
            std::thread::sleep(IDLE_POLL);
            continue;
        }
        match cfg.link.wire {
            WireFormat::Ascii => {
                for line in lines.feed(&buf[..n]) {
                    glove.parse_line(&String::from_utf8_lossy(&line));
                    emit(json, &glove, render_glove);
                    shown += 1;
                }
            }
            WireFormat::Binary => {
                for payload in frames.feed(&buf[..n]) {
                    match TelemetryFrame::decode(&payload) {
                        Ok(frame) => {
                            emit(json, &frame, render_frame);
                            shown += 1;
                        }
                        Err(e) => warn!(error = %e, "telemetry frame dropped"),
                    }
                }
            }
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, frame: &T, render: fn(&T) -> String) {
    if !json {
        println!("{}", render(frame));
        return;
    }
    let record = MonitorRecord {
        received_at: chrono::Utc::now().to_rfc3339(),
        frame,
    };
    match serde_json::to_string(&record) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to encode monitor record"),
    }
}

fn render_glove(glove: &HostGloveState) -> String {
    let curls: Vec<String> = glove
        .finger_curls
        .iter()
        .map(|c| format!("{:>3.0}%", c * 100.0))
        .collect();
    format!(
        "curl [{}]  joy ({:+.2}, {:+.2})  {}",
        curls.join(" "),
        glove.joystick[0],
        glove.joystick[1],
        render_buttons(glove.to_buttons_bitmask())
    )
}

fn render_frame(frame: &TelemetryFrame) -> String {
    let curls: Vec<String> = frame
        .finger_angles
        .iter()
        .map(|a| format!("{a:>4}"))
        .collect();
    format!(
        "curl [{}]  joy ({}, {})  {}  bat {}%",
        curls.join(" "),
        frame.joystick_xy[0],
        frame.joystick_xy[1],
        render_buttons(frame.buttons_bitmask),
        frame.battery_percent
    )
}

fn render_buttons(mask: u32) -> String {
    [
        (Button::Trigger, "TRG"),
        (Button::JoystickClick, "JOY"),
        (Button::A, "A"),
        (Button::B, "B"),
    ]
    .into_iter()
    .map(|(button, name)| {
        if button.is_set(mask) {
            name.green().bold().to_string()
        } else {
            name.dimmed().to_string()
        }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// send
// ─────────────────────────────────────────────────────────────────────────────

/// Wire bytes for one command in `wire` format.
fn command_bytes(
    wire: WireFormat,
    servos: &[(Finger, i32)],
    vibration_rpm: Option<u16>,
) -> Vec<u8> {
    match wire {
        WireFormat::Ascii => {
            let mut commands: Vec<HostCommand> = servos
                .iter()
                .map(|&(finger, degrees)| HostCommand::ServoTarget { finger, degrees })
                .collect();
            if let Some(rpm) = vibration_rpm {
                commands.push(HostCommand::Vibration { rpm });
            }
            encode_command(&commands).into_bytes()
        }
        WireFormat::Binary => {
            let mut frame = CommandFrame {
                vibration_rpms: [vibration_rpm.unwrap_or(0); FINGER_COUNT],
                ..CommandFrame::default()
            };
            for &(finger, degrees) in servos {
                frame.servo_target_angles[finger.index()] = degrees;
            }
            wrap_frame(&frame.encode())
        }
    }
}

fn revs_to_rpm(revs_per_second: f64) -> Result<u16, Failure> {
    let rpm = (revs_per_second * 60.0).round();
    if !(0.0..=f64::from(u16::MAX)).contains(&rpm) {
        return Err(Failure::Usage(format!(
            "vibration {revs_per_second} rev/s is outside 0..={:.2}",
            f64::from(u16::MAX) / 60.0
        )));
    }
    Ok(rpm as u16)
}

fn run_send(
    cfg: &GloveConfig,
    servos: &[(Finger, i32)],
    vibration: Option<f64>,
) -> Result<(), Failure> {
    if servos.is_empty() && vibration.is_none() {
        return Err(Failure::Usage(
            "nothing to send; pass --servo and/or --vibration".to_string(),
        ));
    }
    let rpm = vibration.map(revs_to_rpm).transpose()?;
    let bytes = command_bytes(cfg.link.wire, servos, rpm);

    let mut link = open_host_link(cfg)?;
    link.write_all(&bytes)
        .and_then(|()| link.flush())
        .map_err(|e| Failure::Connection(e.to_string()))?;
    eprintln!("  {} {} bytes", "sent".green(), bytes.len());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

fn run_config(action: ConfigAction, path: Option<PathBuf>) -> Result<(), Failure> {
    let path = path.unwrap_or_else(config::config_path);
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let cfg = config::resolve(Some(path.as_path())).map_err(Failure::Usage)?;
            let text = toml::to_string_pretty(&cfg)
                .map_err(|e| Failure::Usage(format!("Failed to serialize config: {e}")))?;
            println!("# {}", path.display());
            print!("{text}");
            Ok(())
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(Failure::Usage(format!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                )));
            }
            config::save_to(&GloveConfig::default(), &path).map_err(Failure::Usage)?;
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    eprintln!();
    eprintln!(
        "  {} {}",
        "EchoHand".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Simulated haptic glove");
    eprintln!();
}
