use crate::config::Phase;
use crate::controls::boost::BoostTrigger;
use crate::engine::{ChargeLimits, DecisionReason, OutletMode, TelemetryView};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main driver state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is in error state
    Error(String),
    /// Driver is shutting down
    ShuttingDown,
}

/// Per-outlet view for the status API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutletStatus {
    pub id: String,
    pub name: String,
    pub priority: u8,
    pub phase: Phase,
    pub rated_power_w: f64,
    pub mode: OutletMode,
    /// State requested by the last cycle
    pub desired_on: bool,
    /// Last state the plug confirmed, if known
    pub acked_on: Option<bool>,
    pub reason: Option<DecisionReason>,
    pub lockout: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverSnapshot {
    pub timestamp: String,
    pub driver_state: DriverState,
    pub telemetry: Option<TelemetryView>,
    /// Charge limits last acknowledged by the inverter
    pub charge: Option<ChargeLimits>,
    pub charge_error: Option<String>,
    pub critical: bool,
    pub boost_amps: u16,
    pub boost_trigger: Option<BoostTrigger>,
    pub baseline_max_charge_amps: u16,
    pub schedule_window: Option<String>,
    pub saturated_phases: [bool; 3],
    pub outlets: Vec<OutletStatus>,
    /// Whether Modbus appears connected (if known)
    pub inverter_connected: Option<bool>,
    pub last_error: Option<String>,
    pub cycle_duration_ms: Option<u64>,
    pub total_cycles: u64,
    pub skipped_cycles: u64,
    pub overrun_count: u64,
    pub poll_interval_ms: u64,
}

impl DriverSnapshot {
    pub fn initial(poll_interval_ms: u64) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: DriverState::Initializing,
            telemetry: None,
            charge: None,
            charge_error: None,
            critical: false,
            boost_amps: 0,
            boost_trigger: None,
            baseline_max_charge_amps: 0,
            schedule_window: None,
            saturated_phases: [false; 3],
            outlets: Vec::new(),
            inverter_connected: None,
            last_error: None,
            cycle_duration_ms: None,
            total_cycles: 0,
            skipped_cycles: 0,
            overrun_count: 0,
            poll_interval_ms,
        }
    }

    pub fn outlet(&self, id: &str) -> Option<&OutletStatus> {
        self.outlets.iter().find(|o| o.id == id)
    }
}

/// Commands accepted by the driver from external components (web, etc.)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    SetOutletMode { id: String, mode: OutletMode },
    /// Reload from `path`, or from the file the driver was started with
    ReloadConfig { path: Option<PathBuf> },
}
