//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section carries serde defaults, so a
//! file only needs to mention what differs from the stock installation.

use crate::error::{HeliosError, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;
pub mod hhmm;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Modbus TCP connection to the inverter
    pub inverter: InverterConfig,

    /// Inverter register map
    pub registers: RegistersConfig,

    /// Hardware limits of the inverter/battery
    pub hardware: HardwareConfig,

    /// Time-of-day charge current schedule
    pub schedule: ScheduleConfig,

    /// Battery boost protection against export and over-voltage
    pub protection: ProtectionConfig,

    /// Non-negotiable safety bounds
    pub safety: SafetyConfig,

    /// Switched loads, in any order (allocation order comes from `priority`)
    pub outlets: Vec<OutletConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Status/override API binding
    pub web: WebConfig,

    /// Control cycle interval in milliseconds
    pub poll_interval_ms: u64,

    /// IANA timezone for schedule windows
    pub timezone: String,
}

/// Modbus TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InverterConfig {
    /// IP address of the inverter (or its Modbus TCP gateway)
    pub ip: String,

    /// TCP port (typically 502)
    pub port: u16,

    /// Modbus unit id
    pub unit_id: u8,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds
    pub operation_timeout_ms: u64,

    /// Reconnect attempts before a request is reported as failed
    pub max_retries: u32,

    /// Delay between reconnect attempts in milliseconds
    pub retry_delay_ms: u64,
}

/// Width of a multi-word control register
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegisterWidth {
    /// One 16-bit register
    Single,
    /// Two registers, high word first
    Double,
}

/// Modbus register address mappings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistersConfig {
    /// First register of the telemetry block
    pub telemetry_start: u16,

    /// Number of registers in the telemetry block
    pub telemetry_count: u16,

    /// Offsets inside the telemetry block
    pub soc_offset: u16,
    pub battery_power_offset: u16,
    pub grid_power_offset: u16,
    pub voltage_offset: u16,
    pub phase_load_offset: u16,
    pub pv_power_offsets: Vec<u16>,

    /// Multiplier applied to raw voltage registers
    pub voltage_scale: f64,

    /// Control registers
    pub max_charge_amps: u16,
    pub max_discharge_amps: u16,
    pub grid_charge_current: u16,
    pub max_sell_power: u16,

    /// Encoding of the sell power register
    pub sell_power_width: RegisterWidth,

    /// Watts per register unit for the sell power register
    pub sell_power_scale: f64,
}

/// Hardware limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    /// Absolute ceiling for max charge current (A)
    pub max_charge_amps_limit: u16,

    /// Max discharge current written once at startup (A)
    pub max_discharge_amps: Option<u16>,

    /// Optional max solar sell power override (W) written with every limit update
    pub sell_power_limit_w: Option<u32>,

    /// Rewrite unchanged charge limits after this many seconds
    pub charge_refresh_secs: u64,
}

/// A time-of-day window with its own charge current pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleWindow {
    /// Optional label for logs and the status API
    #[serde(default)]
    pub name: String,

    /// Inclusive start, "HH:MM"
    #[serde(with = "hhmm")]
    pub start: NaiveTime,

    /// Exclusive end, "HH:MM"; earlier than `start` wraps past midnight
    #[serde(with = "hhmm")]
    pub end: NaiveTime,

    /// Days the window starts on (0=Mon, 6=Sun); empty means every day
    #[serde(default)]
    pub days: Vec<u8>,

    /// Max battery charge current inside the window (A)
    pub max_charge_amps: u16,

    /// Grid charge current inside the window (A)
    pub grid_charge_amps: u16,
}

/// Charge schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// When false the default pair always applies
    pub enabled: bool,

    /// Max charge current outside all windows (A)
    pub default_max_charge_amps: u16,

    /// Grid charge current outside all windows (A)
    pub default_grid_charge_amps: u16,

    /// Non-overlapping windows
    pub windows: Vec<ScheduleWindow>,
}

/// Battery boost protection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtectionConfig {
    pub enabled: bool,

    /// Inverter sell limit the thresholds are relative to (W)
    pub max_sell_power_w: f64,

    /// Export at or above this share of the sell limit triggers a boost step
    pub power_threshold_pct: f64,

    /// Export below this share (with voltage below recovery) steps back down
    pub recovery_threshold_pct: f64,

    /// Any phase at or above this voltage triggers a boost step
    pub voltage_warning: f64,

    /// All phases below this voltage allow recovery
    pub voltage_recovery: f64,

    /// Amps added or removed per adjustment
    pub charge_step_amps: u16,

    /// Minimum seconds between adjustments
    pub adjustment_interval_secs: u64,
}

/// Safety supervisor bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Any phase at or below this voltage cuts every outlet and charging (V)
    pub critical_voltage: f64,

    /// Per-phase load ceiling (W)
    pub phase_max_w: f64,

    /// Optional ceiling for the sum of all phase loads plus newly switched outlets (W)
    pub max_total_load_w: Option<f64>,
}

/// Grid phase an outlet is wired to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    /// Index into per-phase telemetry arrays
    pub const fn index(self) -> usize {
        match self {
            Self::L1 => 0,
            Self::L2 => 1,
            Self::L3 => 2,
        }
    }
}

/// Network address and credentials of a smart plug relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlugEndpoint {
    pub host: String,
    pub port: u16,
    /// Relay channel on multi-relay devices
    pub channel: u8,
    pub username: Option<String>,
    pub password: Option<String>,
    /// HTTP request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Decision thresholds for a single outlet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutletRules {
    /// Switch on at or above this SOC (%)
    pub start_soc: f64,
    /// Switch off at or below this SOC (%)
    pub stop_soc: f64,
    /// Spare watts required on the phase before switching on
    pub headroom_w: f64,
    /// Phase voltage that forces the outlet on to sink excess power
    pub hv_threshold: f64,
    /// Phase voltage below which the delayed shutoff timer runs
    pub lv_threshold: f64,
    /// Seconds of continuous low voltage before switching off
    pub lv_delay_secs: u64,
    /// Voltage that must be held before a low-voltage shutoff may be undone
    pub lv_recovery_voltage: f64,
    /// Seconds `lv_recovery_voltage` must be held
    pub lv_recovery_delay_secs: u64,
    /// Use SOC start/stop rules
    pub soc_enabled: bool,
    /// Use high/low voltage rules
    pub voltage_enabled: bool,
    /// Switch on when grid export reaches `export_limit_w`
    pub export_enabled: bool,
    pub export_limit_w: f64,
}

/// A switched load
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutletConfig {
    /// Stable identity used in commands and the API
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 1 is the highest priority
    pub priority: u8,
    pub phase: Phase,
    /// Nominal draw used for the running headroom tally (W)
    pub rated_power_w: f64,
    pub endpoint: PlugEndpoint,
    #[serde(default)]
    pub rules: OutletRules,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for console output level
    pub console_level: Option<String>,

    /// Optional override for file output level
    pub file_level: Option<String>,

    /// Log directory, or a file path whose parent is used
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the configuration file to use, if any exists
    pub fn resolve_path() -> Option<String> {
        if let Ok(path) = std::env::var("HELIOS_CONFIG")
            && !path.is_empty()
        {
            return Some(path);
        }

        let default_paths = [
            "helios.yaml",
            "/data/helios.yaml",
            "/etc/helios/config.yaml",
        ];
        default_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| (*p).to_string())
    }

    /// Load configuration from the first available location, falling back to defaults
    pub fn load() -> Result<Self> {
        let config = match Self::resolve_path() {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Look up an outlet by id
    pub fn outlet(&self, id: &str) -> Option<&OutletConfig> {
        self.outlets.iter().find(|o| o.id == id)
    }

    /// Parsed schedule timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| HeliosError::validation("timezone", e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.inverter.ip.is_empty() {
            return Err(HeliosError::validation(
                "inverter.ip",
                "IP address cannot be empty",
            ));
        }
        if self.inverter.port == 0 {
            return Err(HeliosError::validation(
                "inverter.port",
                "Port must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(HeliosError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }
        self.tz()?;

        self.validate_registers()?;
        self.validate_schedule()?;
        self.validate_protection()?;
        self.validate_safety()?;
        self.validate_outlets()?;
        Ok(())
    }

    fn validate_registers(&self) -> Result<()> {
        let r = &self.registers;
        let mut offsets = vec![
            ("registers.soc_offset", r.soc_offset),
            ("registers.battery_power_offset", r.battery_power_offset),
            ("registers.grid_power_offset", r.grid_power_offset),
            ("registers.voltage_offset", r.voltage_offset.saturating_add(2)),
            ("registers.phase_load_offset", r.phase_load_offset.saturating_add(2)),
        ];
        offsets.extend(
            r.pv_power_offsets
                .iter()
                .map(|o| ("registers.pv_power_offsets", *o)),
        );
        for (field, last) in offsets {
            if last >= r.telemetry_count {
                return Err(HeliosError::validation(
                    field,
                    format!("Outside telemetry block of {} registers", r.telemetry_count),
                ));
            }
        }
        if r.voltage_scale <= 0.0 || r.sell_power_scale <= 0.0 {
            return Err(HeliosError::validation(
                "registers",
                "Scale factors must be positive",
            ));
        }
        Ok(())
    }

    fn validate_schedule(&self) -> Result<()> {
        let limit = self.hardware.max_charge_amps_limit;
        let s = &self.schedule;
        if s.default_max_charge_amps > limit {
            return Err(HeliosError::validation(
                "schedule.default_max_charge_amps",
                format!("Exceeds hardware limit of {} A", limit),
            ));
        }
        for (i, w) in s.windows.iter().enumerate() {
            if w.max_charge_amps > limit {
                return Err(HeliosError::validation(
                    format!("schedule.windows[{}].max_charge_amps", i),
                    format!("Exceeds hardware limit of {} A", limit),
                ));
            }
            if w.days.iter().any(|d| *d > 6) {
                return Err(HeliosError::validation(
                    format!("schedule.windows[{}].days", i),
                    "Days must be 0 (Mon) through 6 (Sun)".to_string(),
                ));
            }
        }
        if let Some((a, b)) = crate::controls::schedule::find_overlap(&s.windows) {
            return Err(HeliosError::validation(
                "schedule.windows",
                format!("Windows {} and {} overlap", a, b),
            ));
        }
        Ok(())
    }

    fn validate_protection(&self) -> Result<()> {
        let p = &self.protection;
        if p.max_sell_power_w <= 0.0 {
            return Err(HeliosError::validation(
                "protection.max_sell_power_w",
                "Must be positive",
            ));
        }
        if !(0.0..=100.0).contains(&p.power_threshold_pct)
            || !(0.0..=100.0).contains(&p.recovery_threshold_pct)
        {
            return Err(HeliosError::validation(
                "protection",
                "Thresholds are percentages between 0 and 100",
            ));
        }
        if p.recovery_threshold_pct >= p.power_threshold_pct {
            return Err(HeliosError::validation(
                "protection.recovery_threshold_pct",
                "Must be below power_threshold_pct",
            ));
        }
        if p.voltage_recovery >= p.voltage_warning {
            return Err(HeliosError::validation(
                "protection.voltage_recovery",
                "Must be below voltage_warning",
            ));
        }
        if p.charge_step_amps == 0 {
            return Err(HeliosError::validation(
                "protection.charge_step_amps",
                "Must be greater than 0",
            ));
        }
        Ok(())
    }

    fn validate_safety(&self) -> Result<()> {
        if self.safety.phase_max_w <= 0.0 {
            return Err(HeliosError::validation(
                "safety.phase_max_w",
                "Must be positive",
            ));
        }
        if self.safety.critical_voltage <= 0.0 {
            return Err(HeliosError::validation(
                "safety.critical_voltage",
                "Must be positive",
            ));
        }
        if let Some(total) = self.safety.max_total_load_w
            && total <= 0.0
        {
            return Err(HeliosError::validation(
                "safety.max_total_load_w",
                "Must be positive when set",
            ));
        }
        Ok(())
    }

    fn validate_outlets(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for o in &self.outlets {
            let field = |name: &str| format!("outlets.{}.{}", o.id, name);
            if o.id.is_empty() {
                return Err(HeliosError::validation("outlets.id", "Must not be empty"));
            }
            if !ids.insert(o.id.as_str()) {
                return Err(HeliosError::validation(
                    field("id"),
                    "Duplicate outlet id".to_string(),
                ));
            }
            if o.priority == 0 {
                return Err(HeliosError::validation(
                    field("priority"),
                    "Priority starts at 1".to_string(),
                ));
            }
            if o.rated_power_w < 0.0 {
                return Err(HeliosError::validation(
                    field("rated_power_w"),
                    "Must not be negative".to_string(),
                ));
            }
            if o.endpoint.host.is_empty() {
                return Err(HeliosError::validation(
                    field("endpoint.host"),
                    "Must not be empty".to_string(),
                ));
            }

            let r = &o.rules;
            if !(0.0..=100.0).contains(&r.start_soc) || !(0.0..=100.0).contains(&r.stop_soc) {
                return Err(HeliosError::validation(
                    field("rules"),
                    "SOC thresholds are percentages between 0 and 100".to_string(),
                ));
            }
            if r.stop_soc >= r.start_soc {
                return Err(HeliosError::validation(
                    field("rules.start_soc"),
                    "start_soc must be greater than stop_soc".to_string(),
                ));
            }
            if r.headroom_w < 0.0 {
                return Err(HeliosError::validation(
                    field("rules.headroom_w"),
                    "Must not be negative".to_string(),
                ));
            }
            if r.hv_threshold <= r.lv_threshold {
                return Err(HeliosError::validation(
                    field("rules.hv_threshold"),
                    "hv_threshold must be greater than lv_threshold".to_string(),
                ));
            }
            if r.lv_threshold <= self.safety.critical_voltage {
                return Err(HeliosError::validation(
                    field("rules.lv_threshold"),
                    "lv_threshold must be greater than safety.critical_voltage".to_string(),
                ));
            }
            if r.lv_recovery_voltage < r.lv_threshold {
                return Err(HeliosError::validation(
                    field("rules.lv_recovery_voltage"),
                    "Must be at least lv_threshold".to_string(),
                ));
            }
            if r.export_enabled && r.export_limit_w <= 0.0 {
                return Err(HeliosError::validation(
                    field("rules.export_limit_w"),
                    "Must be positive when export dump is enabled".to_string(),
                ));
            }
        }
        Ok(())
    }
}
