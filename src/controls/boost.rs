//! Battery boost protection.
//!
//! When export approaches the inverter's sell limit, or a phase voltage
//! climbs towards the grid's upper bound, extra charge current is stepped in
//! on top of the schedule so the battery absorbs the surplus. Steps are rate
//! limited, and the gap between the trigger and recovery thresholds is a dead
//! zone in which nothing changes.

use crate::config::ProtectionConfig;
use crate::engine::TelemetrySnapshot;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What the readings ask the protection to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostTrigger {
    Boost,
    Recover,
    Hold,
}

pub fn trigger(snapshot: &TelemetrySnapshot, cfg: &ProtectionConfig) -> BoostTrigger {
    let export = snapshot.total_export_w;
    let vmax = snapshot.max_voltage();
    let boost_at = cfg.max_sell_power_w * cfg.power_threshold_pct / 100.0;
    let recover_below = cfg.max_sell_power_w * cfg.recovery_threshold_pct / 100.0;

    if export >= boost_at || vmax >= cfg.voltage_warning {
        BoostTrigger::Boost
    } else if export < recover_below && vmax < cfg.voltage_recovery {
        BoostTrigger::Recover
    } else {
        BoostTrigger::Hold
    }
}

/// Boost carried across cycles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionState {
    /// Amps added on top of the schedule baseline
    pub boost_amps: u16,
    /// When `boost_amps` last changed by a step
    pub last_adjustment: Option<Instant>,
}

impl ProtectionState {
    pub const fn is_boosted(&self) -> bool {
        self.boost_amps > 0
    }

    /// Advance the protection by one cycle and return the max charge current
    /// to command, never above `hw_limit`.
    pub fn update(
        &mut self,
        snapshot: &TelemetrySnapshot,
        cfg: &ProtectionConfig,
        hw_limit: u16,
        baseline_max: u16,
    ) -> u16 {
        let cap = hw_limit.saturating_sub(baseline_max);

        if !cfg.enabled {
            if self.boost_amps > 0 {
                debug!(boost_amps = self.boost_amps, "protection disabled, dropping boost");
            }
            self.boost_amps = 0;
            return baseline_max.min(hw_limit);
        }

        // The baseline may have risen since the last step
        if self.boost_amps > cap {
            debug!(from = self.boost_amps, to = cap, "boost clipped to hardware headroom");
            self.boost_amps = cap;
        }

        let now = snapshot.taken_at;
        let interval = Duration::from_secs(cfg.adjustment_interval_secs);
        let due = self
            .last_adjustment
            .is_none_or(|t| now.duration_since(t) >= interval);

        let next = match trigger(snapshot, cfg) {
            BoostTrigger::Boost if due => self.boost_amps.saturating_add(cfg.charge_step_amps).min(cap),
            BoostTrigger::Recover if due => self.boost_amps.saturating_sub(cfg.charge_step_amps),
            _ => self.boost_amps,
        };

        if next != self.boost_amps {
            info!(
                from = self.boost_amps,
                to = next,
                export_w = snapshot.total_export_w,
                max_voltage = snapshot.max_voltage(),
                "battery boost adjusted"
            );
            self.boost_amps = next;
            self.last_adjustment = Some(now);
        }

        baseline_max.saturating_add(self.boost_amps).min(hw_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::snapshot;

    fn cfg() -> ProtectionConfig {
        ProtectionConfig {
            enabled: true,
            max_sell_power_w: 8000.0,
            power_threshold_pct: 95.0,
            recovery_threshold_pct: 85.0,
            voltage_warning: 250.0,
            voltage_recovery: 245.0,
            charge_step_amps: 10,
            adjustment_interval_secs: 30,
        }
    }

    #[test]
    fn trigger_thresholds() {
        let c = cfg();
        let mut s = snapshot(80.0);
        s.total_export_w = 7600.0;
        assert_eq!(trigger(&s, &c), BoostTrigger::Boost);
        s.total_export_w = 7000.0;
        assert_eq!(trigger(&s, &c), BoostTrigger::Hold);
        s.total_export_w = 6799.0;
        assert_eq!(trigger(&s, &c), BoostTrigger::Recover);
        s.voltages = [230.0, 250.0, 230.0];
        assert_eq!(trigger(&s, &c), BoostTrigger::Boost);
        s.voltages = [230.0, 247.0, 230.0];
        assert_eq!(trigger(&s, &c), BoostTrigger::Hold);
    }

    #[test]
    fn steps_up_once_per_interval() {
        let c = cfg();
        let mut st = ProtectionState::default();
        let mut s = snapshot(80.0);
        s.total_export_w = 7700.0;
        let t0 = s.taken_at;

        assert_eq!(st.update(&s, &c, 185, 50), 60);
        s.taken_at = t0 + Duration::from_secs(10);
        assert_eq!(st.update(&s, &c, 185, 50), 60);
        s.taken_at = t0 + Duration::from_secs(30);
        assert_eq!(st.update(&s, &c, 185, 50), 70);
        assert_eq!(st.last_adjustment, Some(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn never_exceeds_hardware_limit() {
        let c = cfg();
        let mut st = ProtectionState::default();
        let mut s = snapshot(80.0);
        s.total_export_w = 9000.0;
        let t0 = s.taken_at;
        for i in 0..20u64 {
            s.taken_at = t0 + Duration::from_secs(i * 30);
            let out = st.update(&s, &c, 100, 85);
            assert!(out <= 100);
            assert!(st.boost_amps + 85 <= 100);
        }
        assert_eq!(st.boost_amps, 15);
    }

    #[test]
    fn saturated_step_does_not_reset_timer() {
        let c = cfg();
        let mut st = ProtectionState {
            boost_amps: 15,
            last_adjustment: None,
        };
        let mut s = snapshot(80.0);
        s.total_export_w = 9000.0;
        st.update(&s, &c, 100, 85);
        assert_eq!(st.boost_amps, 15);
        assert_eq!(st.last_adjustment, None);
    }

    #[test]
    fn baseline_rise_clips_boost() {
        let c = cfg();
        let mut st = ProtectionState {
            boost_amps: 40,
            last_adjustment: None,
        };
        let mut s = snapshot(80.0);
        s.total_export_w = 7000.0; // dead zone
        assert_eq!(st.update(&s, &c, 185, 160), 185);
        assert_eq!(st.boost_amps, 25);
        assert_eq!(st.last_adjustment, None);
    }

    #[test]
    fn recovers_in_steps_to_zero() {
        let c = cfg();
        let mut st = ProtectionState {
            boost_amps: 15,
            last_adjustment: None,
        };
        let mut s = snapshot(80.0);
        s.total_export_w = 0.0;
        let t0 = s.taken_at;
        assert_eq!(st.update(&s, &c, 185, 50), 55);
        s.taken_at = t0 + Duration::from_secs(30);
        assert_eq!(st.update(&s, &c, 185, 50), 50);
        assert!(!st.is_boosted());
        s.taken_at = t0 + Duration::from_secs(60);
        st.update(&s, &c, 185, 50);
        assert_eq!(st.last_adjustment, Some(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn disabled_passes_baseline_through() {
        let mut c = cfg();
        c.enabled = false;
        let mut st = ProtectionState {
            boost_amps: 20,
            last_adjustment: None,
        };
        let mut s = snapshot(80.0);
        s.total_export_w = 9000.0;
        assert_eq!(st.update(&s, &c, 185, 50), 50);
        assert_eq!(st.boost_amps, 0);
    }
}
