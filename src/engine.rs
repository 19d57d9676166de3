//! Decision engine
//!
//! [`run_cycle`] maps one telemetry snapshot, the active configuration and
//! the manual override table to a [`CommandSet`]. It performs no I/O and
//! never fails; all state that has to survive between cycles lives in
//! [`EngineState`] and is mutated only here.
//!
//! Order per cycle: safety assessment (a critical undervoltage ends the
//! cycle immediately), charge schedule, battery boost protection, outlet
//! allocation.

pub mod types;

pub use types::{
    ChargeLimits, CommandSet, DecisionReason, ManualOverrides, OutletCommand, OutletMode,
    TelemetrySnapshot, TelemetryView,
};

use crate::config::Config;
use crate::controls::boost::ProtectionState;
use crate::controls::outlets::OutletController;
use crate::controls::{safety, schedule};
use tracing::{debug, error};

/// Hysteresis state carried from one cycle to the next
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub protection: ProtectionState,
    pub outlets: OutletController,
    /// A critical undervoltage cutoff was active last cycle
    pub critical_active: bool,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run one control cycle
pub fn run_cycle(
    snapshot: &TelemetrySnapshot,
    config: &Config,
    overrides: &ManualOverrides,
    state: &mut EngineState,
) -> CommandSet {
    let verdict = safety::assess(snapshot, &config.safety);

    if verdict.critical_low_voltage {
        if !state.critical_active {
            error!(
                min_voltage = verdict.min_voltage,
                critical_voltage = config.safety.critical_voltage,
                "critical undervoltage: all outlets off, charging stopped"
            );
        }
        state.critical_active = true;
        let outlets = state.outlets.force_all_off(config, overrides);
        return CommandSet {
            charge: ChargeLimits {
                max_charge_amps: 0,
                grid_charge_amps: 0,
                max_sell_power_w: config.hardware.sell_power_limit_w,
            },
            outlets,
            critical: true,
            boost_amps: state.protection.boost_amps,
            baseline_max_charge_amps: 0,
            schedule_window: None,
            saturated_phases: verdict.saturated,
        };
    }
    if state.critical_active {
        debug!(min_voltage = verdict.min_voltage, "critical undervoltage cleared");
        state.critical_active = false;
    }

    // Validated configs always carry a known zone
    let tz = config.tz().unwrap_or(chrono_tz::Tz::UTC);
    let base = schedule::baseline(&config.schedule, schedule::local_time(snapshot.wall_clock, tz));

    let max_charge_amps = state.protection.update(
        snapshot,
        &config.protection,
        config.hardware.max_charge_amps_limit,
        base.max_charge_amps,
    );

    let outlets = state.outlets.decide(snapshot, config, overrides, &verdict);

    CommandSet {
        charge: ChargeLimits {
            max_charge_amps,
            grid_charge_amps: base.grid_charge_amps,
            max_sell_power_w: config.hardware.sell_power_limit_w,
        },
        outlets,
        critical: false,
        boost_amps: state.protection.boost_amps,
        baseline_max_charge_amps: base.max_charge_amps,
        schedule_window: base.window,
        saturated_phases: verdict.saturated,
    }
}
