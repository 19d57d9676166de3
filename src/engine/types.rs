use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// One inverter reading, immutable for the duration of a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Battery state of charge (%)
    pub soc: f64,
    /// Phase voltages L1..L3 (V)
    pub voltages: [f64; 3],
    /// Phase loads L1..L3 (W, positive = consumption, negative = export)
    pub phase_loads: [f64; 3],
    /// Power fed into the grid (W, never negative)
    pub total_export_w: f64,
    /// Battery power (W, positive = charging)
    pub battery_power_w: f64,
    /// Solar production (W)
    pub pv_power_w: f64,
    /// Grid power (W, positive = import)
    pub grid_power_w: f64,
    /// Monotonic read time; drives every hysteresis timer
    pub taken_at: Instant,
    /// Wall-clock read time; drives the charge schedule
    pub wall_clock: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn max_voltage(&self) -> f64 {
        self.voltages.iter().copied().fold(f64::MIN, f64::max)
    }

    pub fn min_voltage(&self) -> f64 {
        self.voltages.iter().copied().fold(f64::MAX, f64::min)
    }

    pub fn total_load_w(&self) -> f64 {
        self.phase_loads.iter().sum()
    }
}

/// Serializable view of a snapshot for the status API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TelemetryView {
    pub soc: f64,
    pub voltages: [f64; 3],
    pub phase_loads: [f64; 3],
    pub total_export_w: f64,
    pub battery_power_w: f64,
    pub pv_power_w: f64,
    pub grid_power_w: f64,
    pub timestamp: String,
}

impl From<&TelemetrySnapshot> for TelemetryView {
    fn from(s: &TelemetrySnapshot) -> Self {
        Self {
            soc: s.soc,
            voltages: s.voltages,
            phase_loads: s.phase_loads,
            total_export_w: s.total_export_w,
            battery_power_w: s.battery_power_w,
            pv_power_w: s.pv_power_w,
            grid_power_w: s.grid_power_w,
            timestamp: s.wall_clock.to_rfc3339(),
        }
    }
}

/// Per-outlet control mode, supplied from outside the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", content = "on", rename_all = "snake_case")]
pub enum OutletMode {
    #[default]
    Automatic,
    /// Fixed desired state; only the critical undervoltage cutoff overrides it
    Manual(bool),
}

/// Manual override table keyed by outlet id; absent ids are automatic
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManualOverrides(BTreeMap<String, OutletMode>);

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, id: &str) -> OutletMode {
        self.0.get(id).copied().unwrap_or_default()
    }

    pub fn set(&mut self, id: &str, mode: OutletMode) {
        match mode {
            OutletMode::Automatic => {
                self.0.remove(id);
            }
            OutletMode::Manual(_) => {
                self.0.insert(id.to_string(), mode);
            }
        }
    }

    /// Drop overrides for outlets no longer configured
    pub fn retain_known(&mut self, ids: &[&str]) {
        self.0.retain(|id, _| ids.contains(&id.as_str()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OutletMode)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why an outlet ended up in its commanded state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    CriticalUndervoltage,
    Manual,
    PhaseOverloadShed,
    BatteryLow,
    UndervoltageTimeout,
    UndervoltagePending,
    HighVoltageDump,
    ExportDump,
    SocStart,
    Running,
    WaitPhaseSaturated,
    WaitLowVoltageRecovery,
    WaitHeadroom,
    WaitCharging,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CriticalUndervoltage => "OFF: critical undervoltage",
            Self::Manual => "manual",
            Self::PhaseOverloadShed => "OFF: phase overload",
            Self::BatteryLow => "OFF: battery low",
            Self::UndervoltageTimeout => "OFF: undervoltage timer",
            Self::UndervoltagePending => "ON: undervoltage timer running",
            Self::HighVoltageDump => "ON: high voltage dump",
            Self::ExportDump => "ON: export dump",
            Self::SocStart => "ON: auto-start (SOC)",
            Self::Running => "ON: running",
            Self::WaitPhaseSaturated => "wait: phase saturated",
            Self::WaitLowVoltageRecovery => "wait: low voltage recovery",
            Self::WaitHeadroom => "wait: headroom insufficient",
            Self::WaitCharging => "wait: battery charging",
        };
        f.write_str(text)
    }
}

/// Desired state of one outlet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutletCommand {
    pub id: String,
    pub on: bool,
    pub reason: DecisionReason,
    /// Outlet is under manual override
    pub manual: bool,
}

/// Inverter charge limits for one cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChargeLimits {
    pub max_charge_amps: u16,
    pub grid_charge_amps: u16,
    pub max_sell_power_w: Option<u32>,
}

/// Everything the actuators should do after one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSet {
    pub charge: ChargeLimits,
    /// Outlet commands in priority order
    pub outlets: Vec<OutletCommand>,
    /// Critical undervoltage cutoff was active
    pub critical: bool,
    /// Boost currently added on top of the schedule
    pub boost_amps: u16,
    /// Schedule baseline before boost
    pub baseline_max_charge_amps: u16,
    /// Index of the matching schedule window
    pub schedule_window: Option<usize>,
    pub saturated_phases: [bool; 3],
}

impl CommandSet {
    pub fn outlet(&self, id: &str) -> Option<&OutletCommand> {
        self.outlets.iter().find(|c| c.id == id)
    }

    pub fn is_on(&self, id: &str) -> bool {
        self.outlet(id).is_some_and(|c| c.on)
    }
}
