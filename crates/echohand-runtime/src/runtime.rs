//! [`GloveRuntime`] – owns the worker tasks of one running glove.
//!
//! Each role runs in its own Tokio task on a fixed period and talks to the
//! others only through the shared [`StateBroker`]:
//!
//! | Worker | Period (default) | Job |
//! |---|---|---|
//! | `sampler` | 30 ms | calibrate once, then publish finger/joystick/button frames |
//! | `relay` | 25 ms | apply host commands, send telemetry on change |
//! | `actuator` | 5 ms | drive servos and motors from the targets |
//! | `printer` | 20 ms | debug dump (only when debug mode is on) |
//!
//! A worker whose step fails logs the first failure, keeps running, and logs
//! again when it recovers. [`GloveRuntime::shutdown`] stops every worker and
//! releases the actuator bank.

use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use echohand_hal::{GloveSensors, HapticBank};
use echohand_middleware::{StateBroker, Transport};
use echohand_perception::CalibrationRange;
use echohand_types::{EchoError, FINGER_COUNT};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::actuation::ActuatorDriver;
use crate::config::GloveConfig;
use crate::debug_print::DebugPrinter;
use crate::relay::CommandRelay;
use crate::sampler::SensorSampler;

/// Ranges the sampler settled on, once calibration is over.
pub type CalibrationResult = Option<[CalibrationRange; FINGER_COUNT]>;

/// Failures starting or stopping the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    Config(EchoError),

    #[error("host link failed to start: {0}")]
    Link(EchoError),

    #[error("{role} worker panicked")]
    WorkerPanicked { role: &'static str },
}

struct Worker {
    role: &'static str,
    handle: JoinHandle<()>,
}

/// A running glove.
pub struct GloveRuntime {
    broker: Arc<StateBroker>,
    shutdown: watch::Sender<bool>,
    calibration: watch::Receiver<CalibrationResult>,
    workers: Vec<Worker>,
}

impl GloveRuntime {
    /// Start every worker. Must be called from inside a Tokio runtime.
    ///
    /// `console` receives the debug printer's output when
    /// `config.debug.enabled` is set and is unused otherwise.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] for a configuration that fails
    /// [`GloveConfig::validate`], [`RuntimeError::Link`] when the splay
    /// preamble cannot be written.
    pub fn launch<S, T, W>(
        config: &GloveConfig,
        sensors: S,
        bank: HapticBank,
        link: T,
        console: W,
    ) -> Result<Self, RuntimeError>
    where
        S: GloveSensors + 'static,
        T: Transport + 'static,
        W: Write + Send + 'static,
    {
        config.validate().map_err(RuntimeError::Config)?;

        let broker = Arc::new(StateBroker::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (calibrated_tx, calibration) = watch::channel(None);

        let mut relay = CommandRelay::new(link, Arc::clone(&broker), &config.link)
            .with_silent(config.debug.enabled);
        relay.start().map_err(RuntimeError::Link)?;

        let mut workers = Vec::with_capacity(4);

        let mut sampler = SensorSampler::new(sensors, Arc::clone(&broker), &config.sampler);
        let calibration_cfg = config.calibration.clone();
        let period = config.timing.sampler();
        let mut rx = shutdown_rx.clone();
        workers.push(Worker {
            role: "sampler",
            handle: tokio::spawn(async move {
                let ranges = tokio::select! {
                    ranges = sampler.calibrate(&calibration_cfg) => ranges,
                    _ = stopped(&mut rx) => return,
                };
                calibrated_tx.send_replace(Some(ranges));
                run_periodic("sampler", period, rx, || sampler.tick()).await;
            }),
        });

        let period = config.timing.relay();
        let rx = shutdown_rx.clone();
        workers.push(Worker {
            role: "relay",
            handle: tokio::spawn(async move {
                run_periodic("relay", period, rx, || relay.tick()).await;
            }),
        });

        let mut driver = ActuatorDriver::new(
            bank.with_mirrored(config.actuators.mirrored),
            Arc::clone(&broker),
        );
        let period = config.timing.actuator();
        let rx = shutdown_rx.clone();
        workers.push(Worker {
            role: "actuator",
            handle: tokio::spawn(async move {
                run_periodic("actuator", period, rx, || driver.tick()).await;
                if let Err(err) = driver.release() {
                    warn!(error = %err, "actuator release incomplete");
                }
            }),
        });

        if config.debug.enabled {
            let mut printer = DebugPrinter::new(console, config.debug.style, Arc::clone(&broker));
            let period = config.timing.printer();
            let rx = shutdown_rx;
            workers.push(Worker {
                role: "printer",
                handle: tokio::spawn(async move {
                    run_periodic("printer", period, rx, || printer.tick()).await;
                }),
            });
        }

        info!(
            workers = workers.len(),
            debug = config.debug.enabled,
            wire = ?config.link.wire,
            "glove runtime started"
        );
        Ok(Self {
            broker,
            shutdown,
            calibration,
            workers,
        })
    }

    pub fn broker(&self) -> &Arc<StateBroker> {
        &self.broker
    }

    /// Watch for the end of calibration; holds `None` until then.
    pub fn calibration(&self) -> watch::Receiver<CalibrationResult> {
        self.calibration.clone()
    }

    /// Wait until calibration finished. Returns `None` if the sampler
    /// stopped before it could finish.
    pub async fn calibrated(&self) -> CalibrationResult {
        let mut rx = self.calibration.clone();
        rx.wait_for(Option::is_some).await.ok().and_then(|ranges| *ranges)
    }

    /// Stop every worker and wait for them, releasing the actuators.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::WorkerPanicked`] for the first worker that panicked;
    /// the others are still joined.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        self.shutdown.send_replace(true);
        let mut first_err = None;
        for worker in self.workers {
            if let Err(err) = worker.handle.await {
                warn!(role = worker.role, error = %err, "worker ended abnormally");
                first_err.get_or_insert(RuntimeError::WorkerPanicked { role: worker.role });
            }
        }
        info!("glove runtime stopped");
        first_err.map_or(Ok(()), Err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker loop
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves once shutdown was requested or the runtime was dropped.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run_periodic<E: Display>(
    role: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut step: impl FnMut() -> Result<(), E>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failing = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }
        match step() {
            Ok(()) if failing => {
                info!(role, "worker recovered");
                failing = false;
            }
            Ok(()) => {}
            Err(err) if failing => debug!(role, error = %err, "worker still failing"),
            Err(err) => {
                warn!(role, error = %err, "worker step failed");
                failing = true;
            }
        }
    }
    debug!(role, "worker stopped");
}
