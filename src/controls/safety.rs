//! Hardware safety bounds, evaluated before any other control logic.

use crate::config::SafetyConfig;
use crate::engine::TelemetrySnapshot;

/// Outcome of the safety check for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyVerdict {
    /// Some phase is at or below the critical voltage
    pub critical_low_voltage: bool,
    pub min_voltage: f64,
    /// Phases at or above the load ceiling
    pub saturated: [bool; 3],
}

impl SafetyVerdict {
    pub const fn is_saturated(&self, phase: usize) -> bool {
        phase < 3 && self.saturated[phase]
    }

    pub fn any_saturated(&self) -> bool {
        self.saturated.iter().any(|s| *s)
    }
}

pub fn assess(snapshot: &TelemetrySnapshot, cfg: &SafetyConfig) -> SafetyVerdict {
    let min_voltage = snapshot.min_voltage();
    SafetyVerdict {
        critical_low_voltage: min_voltage <= cfg.critical_voltage,
        min_voltage,
        saturated: snapshot.phase_loads.map(|load| load >= cfg.phase_max_w),
    }
}
