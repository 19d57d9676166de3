//! Runtime driver for Helios
//!
//! [`EmsDriver`] owns every piece of mutable runtime state and runs the
//! control loop: read telemetry, run the decision engine, push the resulting
//! commands to the inverter and the smart plugs, publish a status snapshot.
//! Cycles never overlap; external commands and shutdown are observed only
//! between cycles.

pub mod commands;
mod dispatch;
pub mod types;

pub use types::{DriverCommand, DriverSnapshot, DriverState, OutletStatus};

use crate::config::{Config, OutletConfig};
use crate::controls::boost;
use crate::engine::{self, ChargeLimits, CommandSet, EngineState, ManualOverrides, TelemetryView};
use crate::error::Result;
use crate::inverter::InverterLike;
use crate::logging::{StructuredLogger, get_logger};
use crate::plug::{HttpRelayPlug, OutletSwitch};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Builds the switch for one configured outlet
pub type PlugFactory = Box<dyn Fn(&OutletConfig) -> Result<Arc<dyn OutletSwitch>> + Send + Sync>;

/// Factory for the HTTP relay plugs described in the configuration
pub fn http_plug_factory() -> PlugFactory {
    Box::new(|outlet: &OutletConfig| {
        let plug = HttpRelayPlug::new(&outlet.id, &outlet.endpoint)?;
        Ok(Arc::new(plug) as Arc<dyn OutletSwitch>)
    })
}

/// Main driver for Helios
pub struct EmsDriver {
    config: Config,
    /// File the configuration was loaded from, reused by reloads
    config_path: Option<PathBuf>,

    state: watch::Sender<DriverState>,
    logger: StructuredLogger,

    engine: EngineState,
    overrides: ManualOverrides,

    inverter: Box<dyn InverterLike>,
    plugs: HashMap<String, Arc<dyn OutletSwitch>>,
    plug_factory: PlugFactory,

    /// Last state each plug confirmed; `None` forces a resend
    acked: HashMap<String, Option<bool>>,
    dispatch_errors: HashMap<String, String>,

    last_charge: Option<ChargeLimits>,
    last_charge_write: Option<Instant>,
    charge_error: Option<String>,

    last_commands: Option<CommandSet>,
    last_telemetry: Option<TelemetryView>,
    last_trigger: Option<boost::BoostTrigger>,
    last_error: Option<String>,

    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    snapshot_tx: watch::Sender<Arc<DriverSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<DriverSnapshot>>,

    total_cycles: u64,
    skipped_cycles: u64,
    overrun_count: u64,
    last_cycle_ms: Option<u64>,
}

impl EmsDriver {
    pub fn new(
        config: Config,
        inverter: Box<dyn InverterLike>,
        plug_factory: PlugFactory,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    ) -> Result<Self> {
        let logger = get_logger("driver");
        let (state_tx, _) = watch::channel(DriverState::Initializing);
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let initial = Arc::new(DriverSnapshot::initial(config.poll_interval_ms));
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let mut plugs = HashMap::new();
        for outlet in &config.outlets {
            plugs.insert(outlet.id.clone(), plug_factory(outlet)?);
        }
        logger.info(&format!(
            "Driver initialized with {} outlet(s)",
            config.outlets.len()
        ));

        Ok(Self {
            config,
            config_path: None,
            state: state_tx,
            logger,
            engine: EngineState::new(),
            overrides: ManualOverrides::new(),
            inverter,
            plugs,
            plug_factory,
            acked: HashMap::new(),
            dispatch_errors: HashMap::new(),
            last_charge: None,
            last_charge_write: None,
            charge_error: None,
            last_commands: None,
            last_telemetry: None,
            last_trigger: None,
            last_error: None,
            commands_rx,
            shutdown_tx,
            shutdown_rx,
            snapshot_tx,
            snapshot_rx,
            total_cycles: 0,
            skipped_cycles: 0,
            overrun_count: 0,
            last_cycle_ms: None,
        })
    }

    /// Remember where the configuration came from so reloads can reread it
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn overrides(&self) -> &ManualOverrides {
        &self.overrides
    }

    pub const fn engine_state(&self) -> &EngineState {
        &self.engine
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<DriverSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Handle that stops [`EmsDriver::run`] after the current cycle
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the control loop until shutdown
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting control loop");
        self.state.send_replace(DriverState::Running);

        if let Some(amps) = self.config.hardware.max_discharge_amps
            && let Err(e) = self.inverter.write_max_discharge_amps(amps).await
        {
            self.logger
                .warn(&format!("Failed to set max discharge current: {}", e));
        }
        self.seed_outlets().await;
        self.publish_snapshot();

        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.timed_cycle().await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    let interval_before = self.config.poll_interval_ms;
                    self.handle_command(cmd);
                    if self.config.poll_interval_ms != interval_before {
                        poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
                        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                    self.publish_snapshot();
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
        self.publish_snapshot();
        self.logger.info("Control loop stopped");
        Ok(())
    }

    /// One cycle with bookkeeping: counters, overrun detection, snapshot
    pub async fn timed_cycle(&mut self) {
        let started = Instant::now();
        self.run_once().await;
        let dur_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.total_cycles = self.total_cycles.saturating_add(1);
        self.last_cycle_ms = Some(dur_ms);
        if dur_ms > self.config.poll_interval_ms {
            self.overrun_count = self.overrun_count.saturating_add(1);
            self.logger.warn(&format!(
                "Cycle took {} ms, longer than the {} ms poll interval",
                dur_ms, self.config.poll_interval_ms
            ));
        }
        self.publish_snapshot();
    }

    /// Read, decide, dispatch. Returns false when the cycle was skipped.
    pub(crate) async fn run_once(&mut self) -> bool {
        let snapshot = match self.inverter.read_telemetry().await {
            Ok(s) => s,
            Err(e) => {
                self.skipped_cycles = self.skipped_cycles.saturating_add(1);
                self.logger
                    .warn(&format!("Telemetry read failed, skipping cycle: {}", e));
                self.last_error = Some(e.to_string());
                return false;
            }
        };

        let commands = engine::run_cycle(&snapshot, &self.config, &self.overrides, &mut self.engine);
        self.last_trigger = (!commands.critical && self.config.protection.enabled)
            .then(|| boost::trigger(&snapshot, &self.config.protection));

        self.apply_charge_limits(&commands.charge, snapshot.taken_at).await;
        self.dispatch_outlets(&commands).await;

        self.last_telemetry = Some(TelemetryView::from(&snapshot));
        self.last_commands = Some(commands);
        self.last_error = None;
        true
    }

    /// Query every plug so the engine starts from the physical state
    async fn seed_outlets(&mut self) {
        for outlet in &self.config.outlets {
            let Some(plug) = self.plugs.get(&outlet.id) else {
                continue;
            };
            match plug.get_state().await {
                Ok(state) => {
                    let on = state.as_bool();
                    if let Some(on) = on {
                        self.engine.outlets.seed(&outlet.id, on);
                    }
                    self.acked.insert(outlet.id.clone(), on);
                    self.logger
                        .info(&format!("Outlet {} is {:?}", outlet.id, state));
                }
                Err(e) => {
                    self.acked.insert(outlet.id.clone(), None);
                    self.dispatch_errors.insert(outlet.id.clone(), e.to_string());
                    self.logger
                        .warn(&format!("Outlet {} state unknown: {}", outlet.id, e));
                }
            }
        }
    }

    pub(crate) fn build_snapshot(&self) -> DriverSnapshot {
        let cmds = self.last_commands.as_ref();
        let outlets = self
            .config
            .outlets
            .iter()
            .map(|o| {
                let cmd = cmds.and_then(|c| c.outlet(&o.id));
                let rt = self.engine.outlets.runtime(&o.id);
                OutletStatus {
                    id: o.id.clone(),
                    name: o.name.clone(),
                    priority: o.priority,
                    phase: o.phase,
                    rated_power_w: o.rated_power_w,
                    mode: self.overrides.mode(&o.id),
                    desired_on: cmd.is_some_and(|c| c.on),
                    acked_on: self.acked.get(&o.id).copied().flatten(),
                    reason: cmd.map(|c| c.reason),
                    lockout: rt.is_some_and(|r| r.low_voltage_lockout),
                    last_error: self.dispatch_errors.get(&o.id).cloned(),
                }
            })
            .collect();

        DriverSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: self.state.borrow().clone(),
            telemetry: self.last_telemetry.clone(),
            charge: self.last_charge,
            charge_error: self.charge_error.clone(),
            critical: cmds.is_some_and(|c| c.critical),
            boost_amps: self.engine.protection.boost_amps,
            boost_trigger: self.last_trigger,
            baseline_max_charge_amps: cmds.map_or(0, |c| c.baseline_max_charge_amps),
            schedule_window: cmds
                .and_then(|c| c.schedule_window)
                .and_then(|i| self.config.schedule.windows.get(i))
                .map(|w| w.name.clone()),
            saturated_phases: cmds.map_or([false; 3], |c| c.saturated_phases),
            outlets,
            inverter_connected: self.inverter.connection_status(),
            last_error: self.last_error.clone(),
            cycle_duration_ms: self.last_cycle_ms,
            total_cycles: self.total_cycles,
            skipped_cycles: self.skipped_cycles,
            overrun_count: self.overrun_count,
            poll_interval_ms: self.config.poll_interval_ms,
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.build_snapshot()));
    }
}
