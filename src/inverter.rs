//! Deye hybrid inverter adapter
//!
//! Reads the telemetry block in one request and decodes it into a
//! [`TelemetrySnapshot`]; writes charge limits to the control registers.
//! Register addresses and scaling come from [`RegistersConfig`] so other
//! firmware layouts only need configuration changes.

use crate::config::{RegisterWidth, RegistersConfig};
use crate::engine::{ChargeLimits, TelemetrySnapshot};
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::modbus::{RegisterBus, split_u32, to_signed};
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Inverter operations the driver depends on
#[async_trait::async_trait]
pub trait InverterLike: Send {
    /// One complete, plausibility-checked reading
    async fn read_telemetry(&mut self) -> Result<TelemetrySnapshot>;

    async fn write_charge_limits(&mut self, limits: &ChargeLimits) -> Result<()>;

    async fn write_max_discharge_amps(&mut self, amps: u16) -> Result<()>;

    /// Optional connection status. Default: unknown (None).
    fn connection_status(&self) -> Option<bool> {
        None
    }

    /// Pick up a reloaded register map
    fn apply_register_map(&mut self, _registers: &RegistersConfig) {}
}

fn word(regs: &[u16], offset: u16) -> Result<u16> {
    regs.get(usize::from(offset)).copied().ok_or_else(|| {
        HeliosError::telemetry(format!(
            "Frame of {} registers has no offset {}",
            regs.len(),
            offset
        ))
    })
}

fn triplet(regs: &[u16], start: u16) -> Result<[u16; 3]> {
    Ok([
        word(regs, start)?,
        word(regs, start.saturating_add(1))?,
        word(regs, start.saturating_add(2))?,
    ])
}

/// Decode the raw telemetry block
///
/// Rejects frames that are too short, report a state of charge above 100 %,
/// or read zero on every phase voltage (inverter still booting).
pub fn decode_telemetry(
    regs: &[u16],
    cfg: &RegistersConfig,
    taken_at: Instant,
    wall_clock: DateTime<Utc>,
) -> Result<TelemetrySnapshot> {
    let soc = f64::from(word(regs, cfg.soc_offset)?);
    if soc > 100.0 {
        return Err(HeliosError::telemetry(format!("Implausible SOC {}", soc)));
    }

    let voltages = triplet(regs, cfg.voltage_offset)?.map(|raw| f64::from(raw) * cfg.voltage_scale);
    if voltages.iter().all(|v| *v == 0.0) {
        return Err(HeliosError::telemetry("All phase voltages read zero"));
    }

    let phase_loads = triplet(regs, cfg.phase_load_offset)?.map(|raw| f64::from(to_signed(raw)));
    let battery_power_w = f64::from(to_signed(word(regs, cfg.battery_power_offset)?));
    let grid_power_w = f64::from(to_signed(word(regs, cfg.grid_power_offset)?));

    let mut pv_power_w = 0.0;
    for offset in &cfg.pv_power_offsets {
        pv_power_w += f64::from(word(regs, *offset)?);
    }

    Ok(TelemetrySnapshot {
        soc,
        voltages,
        phase_loads,
        total_export_w: (-grid_power_w).max(0.0),
        battery_power_w,
        pv_power_w,
        grid_power_w,
        taken_at,
        wall_clock,
    })
}

/// Register writes needed to apply `limits`, as `(address, values)` pairs
pub fn encode_charge_limits(limits: &ChargeLimits, cfg: &RegistersConfig) -> Vec<(u16, Vec<u16>)> {
    let mut writes = vec![
        (cfg.max_charge_amps, vec![limits.max_charge_amps]),
        (cfg.grid_charge_current, vec![limits.grid_charge_amps]),
    ];
    if let Some(watts) = limits.max_sell_power_w {
        let raw = (f64::from(watts) / cfg.sell_power_scale).round();
        let values = match cfg.sell_power_width {
            RegisterWidth::Single => vec![raw.clamp(0.0, f64::from(u16::MAX)) as u16],
            RegisterWidth::Double => split_u32(raw.clamp(0.0, f64::from(u32::MAX)) as u32).to_vec(),
        };
        writes.push((cfg.max_sell_power, values));
    }
    writes
}

/// Deye inverter reached through a register bus
pub struct DeyeInverter<B: RegisterBus> {
    bus: B,
    registers: RegistersConfig,
    logger: StructuredLogger,
}

impl<B: RegisterBus> DeyeInverter<B> {
    pub fn new(bus: B, registers: RegistersConfig) -> Self {
        Self {
            bus,
            registers,
            logger: get_logger("inverter"),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[async_trait::async_trait]
impl<B: RegisterBus> InverterLike for DeyeInverter<B> {
    async fn read_telemetry(&mut self) -> Result<TelemetrySnapshot> {
        let regs = self
            .bus
            .read_holding_registers(self.registers.telemetry_start, self.registers.telemetry_count)
            .await?;
        let snapshot = decode_telemetry(&regs, &self.registers, Instant::now(), Utc::now())?;
        self.logger.trace(&format!(
            "SOC {}%, V {:?}, load {:?}, export {} W",
            snapshot.soc, snapshot.voltages, snapshot.phase_loads, snapshot.total_export_w
        ));
        Ok(snapshot)
    }

    async fn write_charge_limits(&mut self, limits: &ChargeLimits) -> Result<()> {
        for (address, values) in encode_charge_limits(limits, &self.registers) {
            self.bus.write_registers(address, &values).await?;
        }
        self.logger.debug(&format!(
            "Charge limits written: max {} A, grid {} A, sell {:?} W",
            limits.max_charge_amps, limits.grid_charge_amps, limits.max_sell_power_w
        ));
        Ok(())
    }

    async fn write_max_discharge_amps(&mut self, amps: u16) -> Result<()> {
        self.bus
            .write_registers(self.registers.max_discharge_amps, &[amps])
            .await?;
        self.logger
            .info(&format!("Max discharge current set to {} A", amps));
        Ok(())
    }

    fn connection_status(&self) -> Option<bool> {
        self.bus.connection_status()
    }

    fn apply_register_map(&mut self, registers: &RegistersConfig) {
        if *registers != self.registers {
            self.logger.info("Register map updated");
            self.registers = registers.clone();
        }
    }
}
