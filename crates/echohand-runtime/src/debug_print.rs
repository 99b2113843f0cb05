//! [`DebugPrinter`] – human-readable dumps of the glove state.
//!
//! Three renderings are available:
//!
//! - [`DebugStyle::Report`] – a multi-line status block for a serial monitor.
//! - [`DebugStyle::Plotter`] – one `Name:value` line per frame, the format
//!   serial plotters graph directly.
//! - [`DebugStyle::Json`] – one JSON object per frame.
//!
//! # Example
//!
//! ```rust
//! use echohand_runtime::debug_print::render_plotter;
//! use echohand_types::StateSnapshot;
//!
//! let snap = StateSnapshot {
//!     finger_angles: [1, 2, 3, 4, 5],
//!     ..StateSnapshot::default()
//! };
//! assert_eq!(render_plotter(&snap), "Thumb:1 Index:2 Middle:3 Ring:4 Pinkie:5\n");
//! ```

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use echohand_middleware::StateBroker;
use echohand_types::{Button, Finger, StateSnapshot};
use serde::{Deserialize, Serialize};

/// Output layout of the debug printer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugStyle {
    #[default]
    Report,
    Plotter,
    Json,
}

/// Render `snapshot` in `style`, trailing newline included.
pub fn render(style: DebugStyle, snapshot: &StateSnapshot) -> String {
    match style {
        DebugStyle::Report => render_report(snapshot),
        DebugStyle::Plotter => render_plotter(snapshot),
        DebugStyle::Json => render_json(snapshot),
    }
}

/// Finger curls as serial-plotter series.
pub fn render_plotter(snapshot: &StateSnapshot) -> String {
    let a = snapshot.finger_angles;
    format!(
        "Thumb:{} Index:{} Middle:{} Ring:{} Pinkie:{}\n",
        a[0], a[1], a[2], a[3], a[4]
    )
}

pub fn render_json(snapshot: &StateSnapshot) -> String {
    // A snapshot is plain numbers and arrays; serialisation cannot fail.
    let mut line = serde_json::to_string(snapshot).unwrap_or_default();
    line.push('\n');
    line
}

/// Full status block.
pub fn render_report(snapshot: &StateSnapshot) -> String {
    let mut out = String::with_capacity(512);
    let _ = writeln!(out, "\n=== PAYLOAD STATUS ===");

    let _ = writeln!(out, "Finger Angles:");
    for finger in Finger::ALL {
        let _ = writeln!(out, "  {:<6}: {}", label(finger), snapshot.finger_angles[finger.index()]);
    }

    let _ = writeln!(out, "\nServo Targets (deg):");
    for finger in Finger::ALL {
        let target = snapshot.servo_target_angles[finger.index()];
        let _ = writeln!(out, "  {:<6}: {:.1}", label(finger), f64::from(target));
    }

    let _ = writeln!(out, "\nVibration RPM:");
    for finger in Finger::ALL {
        let _ = writeln!(
            out,
            "  {:<6}: {}",
            label(finger),
            snapshot.vibration_rpms[finger.index()]
        );
    }

    let [x, y] = snapshot.joystick_xy;
    let _ = writeln!(out, "\nJoystick:\n  X: {x:.3}\n  Y: {y:.3}");

    let mask = snapshot.buttons_bitmask;
    let _ = writeln!(out, "\nButtons:");
    let _ = writeln!(out, "  Bitmask      : 0b{mask:04b} (0x{mask:02X})");
    for (button, name) in [
        (Button::Trigger, "Trigger"),
        (Button::JoystickClick, "Joystick Btn"),
        (Button::A, "A Button"),
        (Button::B, "B Button"),
    ] {
        let state = if snapshot.is_pressed(button) { "PRESSED" } else { "released" };
        let _ = writeln!(out, "  {name:<13}: {state}");
    }

    let _ = writeln!(out, "\nBattery: {}%", snapshot.battery_percent);
    out
}

// The report keeps the five-letter "Pinkie" spelling of the plotter series.
fn label(finger: Finger) -> &'static str {
    match finger {
        Finger::Pinky => "Pinkie",
        other => other.label(),
    }
}

/// Writes one rendering of the broker state per tick.
pub struct DebugPrinter<W> {
    out: W,
    style: DebugStyle,
    broker: Arc<StateBroker>,
}

impl<W: Write> DebugPrinter<W> {
    pub fn new(out: W, style: DebugStyle, broker: Arc<StateBroker>) -> Self {
        Self { out, style, broker }
    }

    pub fn tick(&mut self) -> io::Result<()> {
        let text = render(self.style, &self.broker.take_snapshot());
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateSnapshot {
        StateSnapshot {
            finger_angles: [0, 1024, 2048, 3072, 4095],
            servo_target_angles: [90, 0, 0, 0, 180],
            vibration_rpms: [60, 0, 0, 0, 0],
            joystick_xy: [512.0, 1024.0],
            buttons_bitmask: Button::A.mask() | Button::JoystickClick.mask(),
            battery_percent: 87,
            revision: 12,
        }
    }

    #[test]
    fn plotter_is_one_line_per_frame() {
        assert_eq!(
            render_plotter(&sample()),
            "Thumb:0 Index:1024 Middle:2048 Ring:3072 Pinkie:4095\n"
        );
    }

    #[test]
    fn report_lists_every_section() {
        let report = render_report(&sample());
        assert!(report.contains("=== PAYLOAD STATUS ==="));
        assert!(report.contains("  Thumb : 0\n"));
        assert!(report.contains("  Pinkie: 4095\n"));
        assert!(report.contains("  Thumb : 90.0\n"));
        assert!(report.contains("  X: 512.000\n"));
        assert!(report.contains("Bitmask      : 0b0110 (0x06)"));
        assert!(report.contains("Joystick Btn : PRESSED"));
        assert!(report.contains("B Button     : released"));
        assert!(report.ends_with("Battery: 87%\n"));
    }

    #[test]
    fn json_line_parses_back() {
        let line = render_json(&sample());
        assert!(line.ends_with('\n'));
        let back: StateSnapshot = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn printer_writes_current_state() {
        let broker = Arc::new(StateBroker::new());
        broker.set_finger_angle(1, 7);
        let mut printer = DebugPrinter::new(Vec::new(), DebugStyle::Plotter, broker);

        printer.tick().unwrap();
        printer.tick().unwrap();
        let text = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("Thumb:0 Index:7 "));
    }
}
