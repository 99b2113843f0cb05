//! `echohand-runtime` – The glove's control loops
//!
//! Wires sensors, the state broker, the host link and the actuators into
//! a set of periodic workers.
//!
//! # Modules
//!
//! - [`config`] – [`GloveConfig`][config::GloveConfig]: every deployment
//!   choice (filter, calibration strategy, link, debug output, worker
//!   periods), loadable from TOML.
//! - [`sampler`] – [`SensorSampler`][sampler::SensorSampler]: calibrates the
//!   flex sensors, then publishes filtered and remapped finger curls,
//!   joystick position and buttons as one broker batch per tick.
//! - [`relay`] – [`CommandRelay`][relay::CommandRelay]: polls the host
//!   [`Transport`][echohand_middleware::Transport], applies servo and
//!   vibration commands, and sends telemetry whenever the broker revision
//!   moves.
//! - [`actuation`] – [`ActuatorDriver`][actuation::ActuatorDriver]: drives
//!   the [`HapticBank`][echohand_hal::HapticBank] from the broker's targets.
//! - [`debug_print`] – [`DebugPrinter`][debug_print::DebugPrinter]: report,
//!   plotter or JSON dumps of the glove state.
//! - [`runtime`] – [`GloveRuntime`][runtime::GloveRuntime]: spawns one Tokio
//!   task per role and stops them on shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod actuation;
pub mod config;
pub mod debug_print;
pub mod relay;
pub mod runtime;
pub mod sampler;
pub mod telemetry;

pub use actuation::ActuatorDriver;
pub use config::{GloveConfig, LinkKind, WireFormat};
pub use debug_print::{DebugPrinter, DebugStyle};
pub use relay::{CommandRelay, RelayStats};
pub use runtime::{GloveRuntime, RuntimeError};
pub use sampler::SensorSampler;
pub use telemetry::{TracerProviderGuard, init_tracing};
