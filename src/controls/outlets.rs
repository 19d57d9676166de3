//! Priority-ranked outlet load controller.
//!
//! Each cycle runs four passes over the configured outlets:
//!
//! 1. manual outlets get their requested state;
//! 2. automatic outlets that are on are checked for SOC stop and the
//!    delayed low-voltage shutoff, lowest priority first;
//! 3. every saturated phase that is still over its ceiling sheds its
//!    lowest-priority automatic outlet;
//! 4. automatic outlets that are off are considered for switching on,
//!    highest priority first, against a per-phase tally of power committed
//!    earlier in the same pass.
//!
//! Timers are monotonic (`Instant`) and live in [`OutletRuntime`], which is
//! owned here and mutated once per cycle.

use crate::config::{Config, OutletConfig};
use crate::controls::safety::SafetyVerdict;
use crate::engine::{DecisionReason, ManualOverrides, OutletCommand, OutletMode, TelemetrySnapshot};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutletState {
    #[default]
    Off,
    On,
    /// Physically on while the low-voltage timer runs
    PendingOff,
}

impl OutletState {
    pub const fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Hysteresis state of one outlet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutletRuntime {
    pub state: OutletState,
    /// First cycle of the current low-voltage stretch
    pub low_voltage_since: Option<Instant>,
    /// First cycle of the current stretch at or above the recovery voltage
    pub recovery_since: Option<Instant>,
    /// Switched off by low voltage; must pass the recovery gate
    pub low_voltage_lockout: bool,
    pub last_reason: Option<DecisionReason>,
}

impl OutletRuntime {
    fn switch_on(&mut self) {
        self.state = OutletState::On;
        self.low_voltage_since = None;
        self.recovery_since = None;
        self.low_voltage_lockout = false;
    }

    fn switch_off(&mut self, lockout: bool) {
        self.state = OutletState::Off;
        self.low_voltage_since = None;
        self.recovery_since = None;
        self.low_voltage_lockout = lockout;
    }

    /// Advance the recovery gate; true once the lockout is lifted
    fn update_recovery(&mut self, voltage: f64, recovery_voltage: f64, delay: Duration, now: Instant) -> bool {
        if !self.low_voltage_lockout {
            return true;
        }
        if voltage < recovery_voltage {
            self.recovery_since = None;
            return false;
        }
        let since = *self.recovery_since.get_or_insert(now);
        if now.duration_since(since) >= delay {
            self.low_voltage_lockout = false;
            self.recovery_since = None;
            return true;
        }
        false
    }
}

fn priority_order(outlets: &[OutletConfig]) -> Vec<&OutletConfig> {
    let mut order: Vec<&OutletConfig> = outlets.iter().collect();
    order.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    order
}

/// Owner of every outlet's runtime state
#[derive(Debug, Clone, Default)]
pub struct OutletController {
    runtimes: HashMap<String, OutletRuntime>,
}

impl OutletController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(&self, id: &str) -> Option<&OutletRuntime> {
        self.runtimes.get(id)
    }

    /// Record the physical state of an outlet observed outside a cycle
    pub fn seed(&mut self, id: &str, on: bool) {
        let rt = self.runtimes.entry(id.to_string()).or_default();
        rt.state = if on { OutletState::On } else { OutletState::Off };
    }

    /// Forget outlets that are no longer configured and add new ones as off
    fn sync(&mut self, outlets: &[OutletConfig]) {
        self.runtimes
            .retain(|id, _| outlets.iter().any(|o| &o.id == id));
        for o in outlets {
            self.runtimes.entry(o.id.clone()).or_default();
        }
    }

    /// Critical undervoltage: everything off, manual outlets included
    pub fn force_all_off(&mut self, config: &Config, overrides: &ManualOverrides) -> Vec<OutletCommand> {
        self.sync(&config.outlets);
        let mut commands = Vec::with_capacity(config.outlets.len());
        for o in priority_order(&config.outlets) {
            let Some(rt) = self.runtimes.get_mut(&o.id) else {
                continue;
            };
            if rt.state.is_on() {
                warn!(outlet = %o.id, "critical undervoltage, switching off");
            }
            // Only outlets that were running need the recovery gate
            rt.switch_off(rt.state.is_on() || rt.low_voltage_lockout);
            rt.last_reason = Some(DecisionReason::CriticalUndervoltage);
            commands.push(OutletCommand {
                id: o.id.clone(),
                on: false,
                reason: DecisionReason::CriticalUndervoltage,
                manual: matches!(overrides.mode(&o.id), OutletMode::Manual(_)),
            });
        }
        commands
    }

    /// Decide every outlet's state for this cycle
    pub fn decide(
        &mut self,
        snapshot: &TelemetrySnapshot,
        config: &Config,
        overrides: &ManualOverrides,
        verdict: &SafetyVerdict,
    ) -> Vec<OutletCommand> {
        self.sync(&config.outlets);
        let order = priority_order(&config.outlets);
        let mut reasons: Vec<Option<DecisionReason>> = vec![None; order.len()];
        let mut committed = [0.0_f64; 3];
        let mut freed = [0.0_f64; 3];

        self.apply_manual(&order, overrides, &mut reasons, &mut committed, &mut freed);
        self.off_pass(&order, snapshot, overrides, &mut reasons, &mut freed);
        self.shed_overloaded(&order, snapshot, config, overrides, verdict, &mut reasons, &mut freed);
        self.on_pass(&order, snapshot, config, overrides, verdict, &mut reasons, &mut committed);

        order
            .iter()
            .zip(reasons)
            .filter_map(|(o, reason)| {
                let rt = self.runtimes.get_mut(&o.id)?;
                let reason = reason.unwrap_or(if rt.state.is_on() {
                    DecisionReason::Running
                } else {
                    DecisionReason::WaitCharging
                });
                if rt.last_reason != Some(reason) {
                    debug!(outlet = %o.id, %reason, "outlet decision changed");
                }
                rt.last_reason = Some(reason);
                Some(OutletCommand {
                    id: o.id.clone(),
                    on: rt.state.is_on(),
                    reason,
                    manual: matches!(overrides.mode(&o.id), OutletMode::Manual(_)),
                })
            })
            .collect()
    }

    fn apply_manual(
        &mut self,
        order: &[&OutletConfig],
        overrides: &ManualOverrides,
        reasons: &mut [Option<DecisionReason>],
        committed: &mut [f64; 3],
        freed: &mut [f64; 3],
    ) {
        for (i, o) in order.iter().enumerate() {
            let OutletMode::Manual(want_on) = overrides.mode(&o.id) else {
                continue;
            };
            let Some(rt) = self.runtimes.get_mut(&o.id) else {
                continue;
            };
            let p = o.phase.index();
            if want_on && !rt.state.is_on() {
                info!(outlet = %o.id, "manual override: on");
                rt.switch_on();
                committed[p] += o.rated_power_w;
            } else if !want_on && rt.state.is_on() {
                info!(outlet = %o.id, "manual override: off");
                rt.switch_off(false);
                freed[p] += o.rated_power_w;
            }
            reasons[i] = Some(DecisionReason::Manual);
        }
    }

    fn off_pass(
        &mut self,
        order: &[&OutletConfig],
        snapshot: &TelemetrySnapshot,
        overrides: &ManualOverrides,
        reasons: &mut [Option<DecisionReason>],
        freed: &mut [f64; 3],
    ) {
        let now = snapshot.taken_at;
        for (i, o) in order.iter().enumerate().rev() {
            if reasons[i].is_some() || overrides.mode(&o.id) != OutletMode::Automatic {
                continue;
            }
            let Some(rt) = self.runtimes.get_mut(&o.id) else {
                continue;
            };
            if !rt.state.is_on() {
                continue;
            }

            let p = o.phase.index();
            let r = &o.rules;
            let voltage = snapshot.voltages[p];

            if r.soc_enabled && snapshot.soc <= r.stop_soc {
                info!(outlet = %o.id, soc = snapshot.soc, stop_soc = r.stop_soc, "battery low, switching off");
                rt.switch_off(false);
                freed[p] += o.rated_power_w;
                reasons[i] = Some(DecisionReason::BatteryLow);
                continue;
            }

            if r.voltage_enabled && voltage < r.lv_threshold {
                let since = *rt.low_voltage_since.get_or_insert(now);
                if now.duration_since(since) >= Duration::from_secs(r.lv_delay_secs) {
                    warn!(outlet = %o.id, voltage, lv_threshold = r.lv_threshold, "undervoltage timer expired, switching off");
                    rt.switch_off(true);
                    freed[p] += o.rated_power_w;
                    reasons[i] = Some(DecisionReason::UndervoltageTimeout);
                    continue;
                }
                if rt.state != OutletState::PendingOff {
                    info!(outlet = %o.id, voltage, delay_secs = r.lv_delay_secs, "undervoltage timer started");
                }
                rt.state = OutletState::PendingOff;
                reasons[i] = Some(DecisionReason::UndervoltagePending);
                continue;
            }

            if rt.low_voltage_since.take().is_some() {
                debug!(outlet = %o.id, voltage, "voltage recovered before undervoltage timer expired");
            }
            rt.state = OutletState::On;
            reasons[i] = Some(DecisionReason::Running);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shed_overloaded(
        &mut self,
        order: &[&OutletConfig],
        snapshot: &TelemetrySnapshot,
        config: &Config,
        overrides: &ManualOverrides,
        verdict: &SafetyVerdict,
        reasons: &mut [Option<DecisionReason>],
        freed: &mut [f64; 3],
    ) {
        let phase_max = config.safety.phase_max_w;
        for p in 0..3 {
            if !verdict.is_saturated(p) || snapshot.phase_loads[p] - freed[p] < phase_max {
                continue;
            }
            let victim = order.iter().enumerate().rev().find(|(_, o)| {
                o.phase.index() == p
                    && overrides.mode(&o.id) == OutletMode::Automatic
                    && self.runtimes.get(&o.id).is_some_and(|rt| rt.state.is_on())
            });
            let Some((i, o)) = victim else {
                continue;
            };
            if let Some(rt) = self.runtimes.get_mut(&o.id) {
                warn!(
                    outlet = %o.id,
                    phase = p + 1,
                    load_w = snapshot.phase_loads[p],
                    phase_max_w = phase_max,
                    "phase overloaded, shedding outlet"
                );
                rt.switch_off(false);
                freed[p] += o.rated_power_w;
                reasons[i] = Some(DecisionReason::PhaseOverloadShed);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_pass(
        &mut self,
        order: &[&OutletConfig],
        snapshot: &TelemetrySnapshot,
        config: &Config,
        overrides: &ManualOverrides,
        verdict: &SafetyVerdict,
        reasons: &mut [Option<DecisionReason>],
        committed: &mut [f64; 3],
    ) {
        let now = snapshot.taken_at;
        let phase_max = config.safety.phase_max_w;
        let measured_total = snapshot.total_load_w();
        let mut committed_total: f64 = committed.iter().sum();

        for (i, o) in order.iter().enumerate() {
            if reasons[i].is_some() || overrides.mode(&o.id) != OutletMode::Automatic {
                continue;
            }
            let Some(rt) = self.runtimes.get_mut(&o.id) else {
                continue;
            };
            if rt.state.is_on() {
                continue;
            }

            let p = o.phase.index();
            let r = &o.rules;
            let voltage = snapshot.voltages[p];

            let gate_open = rt.update_recovery(
                voltage,
                r.lv_recovery_voltage,
                Duration::from_secs(r.lv_recovery_delay_secs),
                now,
            );

            if verdict.is_saturated(p) {
                reasons[i] = Some(DecisionReason::WaitPhaseSaturated);
                continue;
            }

            if r.voltage_enabled && voltage >= r.hv_threshold {
                info!(outlet = %o.id, voltage, hv_threshold = r.hv_threshold, "high voltage dump, switching on");
                rt.switch_on();
                committed[p] += o.rated_power_w;
                committed_total += o.rated_power_w;
                reasons[i] = Some(DecisionReason::HighVoltageDump);
                continue;
            }

            if !gate_open {
                reasons[i] = Some(DecisionReason::WaitLowVoltageRecovery);
                continue;
            }

            let soc_start = r.soc_enabled && snapshot.soc >= r.start_soc;
            let export_dump = r.export_enabled
                && snapshot.total_export_w >= r.export_limit_w
                && (!r.soc_enabled || snapshot.soc > r.stop_soc);
            if !soc_start && !export_dump {
                reasons[i] = Some(DecisionReason::WaitCharging);
                continue;
            }

            let remaining = phase_max - snapshot.phase_loads[p] - committed[p];
            let within_total = config
                .safety
                .max_total_load_w
                .is_none_or(|max| measured_total + committed_total + o.rated_power_w <= max);
            if remaining < r.headroom_w || !within_total {
                reasons[i] = Some(DecisionReason::WaitHeadroom);
                continue;
            }

            let reason = if soc_start {
                DecisionReason::SocStart
            } else {
                DecisionReason::ExportDump
            };
            info!(outlet = %o.id, soc = snapshot.soc, remaining_w = remaining, %reason, "switching on");
            rt.switch_on();
            committed[p] += o.rated_power_w;
            committed_total += o.rated_power_w;
            reasons[i] = Some(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Phase;
    use crate::controls::safety::assess;
    use crate::engine::test_support::{outlet, snapshot};

    fn config(outlets: Vec<OutletConfig>) -> Config {
        Config {
            outlets,
            ..Config::default()
        }
    }

    fn run(
        ctl: &mut OutletController,
        s: &TelemetrySnapshot,
        cfg: &Config,
        overrides: &ManualOverrides,
    ) -> Vec<OutletCommand> {
        let verdict = assess(s, &cfg.safety);
        ctl.decide(s, cfg, overrides, &verdict)
    }

    #[test]
    fn ties_break_on_id() {
        let cfg = config(vec![
            outlet("b", 1, Phase::L1, 1000.0),
            outlet("a", 1, Phase::L1, 1000.0),
            outlet("c", 0, Phase::L2, 1000.0),
        ]);
        let ids: Vec<&str> = priority_order(&cfg.outlets).iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn pending_off_keeps_outlet_on() {
        let cfg = config(vec![outlet("hp", 1, Phase::L1, 2000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("hp", true);
        let mut s = snapshot(60.0);
        s.voltages[0] = 205.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::UndervoltagePending);
        assert_eq!(ctl.runtime("hp").unwrap().state, OutletState::PendingOff);
        assert_eq!(ctl.runtime("hp").unwrap().low_voltage_since, Some(s.taken_at));
    }

    #[test]
    fn recovery_gate_requires_continuous_voltage() {
        let cfg = config(vec![outlet("hp", 1, Phase::L1, 2000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("hp", true);
        let mut s = snapshot(80.0);
        let t0 = s.taken_at;

        // Trip the low-voltage shutoff
        s.voltages[0] = 205.0;
        run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        s.taken_at = t0 + Duration::from_secs(10);
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        assert!(ctl.runtime("hp").unwrap().low_voltage_lockout);

        // Recovery voltage for 30 s, then a dip resets the gate
        s.voltages[0] = 225.0;
        s.taken_at = t0 + Duration::from_secs(20);
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert_eq!(cmds[0].reason, DecisionReason::WaitLowVoltageRecovery);
        s.taken_at = t0 + Duration::from_secs(50);
        run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        s.voltages[0] = 215.0;
        s.taken_at = t0 + Duration::from_secs(51);
        run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert_eq!(ctl.runtime("hp").unwrap().recovery_since, None);

        // A full delay above the recovery voltage opens the gate
        s.voltages[0] = 225.0;
        s.taken_at = t0 + Duration::from_secs(60);
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        s.taken_at = t0 + Duration::from_secs(120);
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::SocStart);
        assert!(!ctl.runtime("hp").unwrap().low_voltage_lockout);
    }

    #[test]
    fn high_voltage_dump_bypasses_lockout() {
        let cfg = config(vec![outlet("hp", 1, Phase::L1, 2000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("hp", false);
        ctl.runtimes.get_mut("hp").unwrap().low_voltage_lockout = true;
        let mut s = snapshot(10.0);
        s.voltages[0] = 253.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::HighVoltageDump);
    }

    #[test]
    fn soc_stop_wins_near_high_voltage() {
        let cfg = config(vec![outlet("hp", 1, Phase::L1, 2000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("hp", true);
        let mut s = snapshot(20.0);
        s.voltages[0] = 250.5;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::BatteryLow);
    }

    #[test]
    fn saturated_phase_blocks_dump() {
        let cfg = config(vec![outlet("hp", 1, Phase::L2, 2000.0)]);
        let mut ctl = OutletController::new();
        let mut s = snapshot(90.0);
        s.voltages[1] = 255.0;
        s.phase_loads[1] = 7200.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::WaitPhaseSaturated);
    }

    #[test]
    fn overload_sheds_lowest_priority_only() {
        let cfg = config(vec![
            outlet("a", 1, Phase::L1, 1500.0),
            outlet("b", 2, Phase::L1, 1500.0),
            outlet("c", 3, Phase::L2, 1500.0),
        ]);
        let mut ctl = OutletController::new();
        for id in ["a", "b", "c"] {
            ctl.seed(id, true);
        }
        let mut s = snapshot(90.0);
        s.phase_loads = [7500.0, 3000.0, 0.0];
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        let on: Vec<bool> = cmds.iter().map(|c| c.on).collect();
        assert_eq!(on, [true, false, true]);
        assert_eq!(cmds[1].reason, DecisionReason::PhaseOverloadShed);
    }

    #[test]
    fn soc_stop_frees_enough_to_skip_shedding() {
        let mut low = outlet("low", 2, Phase::L1, 2000.0);
        low.rules.stop_soc = 50.0;
        low.rules.start_soc = 60.0;
        let cfg = config(vec![outlet("high", 1, Phase::L1, 2000.0), low]);
        let mut ctl = OutletController::new();
        ctl.seed("high", true);
        ctl.seed("low", true);
        let mut s = snapshot(45.0);
        s.phase_loads[0] = 8000.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert!(!cmds[1].on);
        assert_eq!(cmds[1].reason, DecisionReason::BatteryLow);
    }

    #[test]
    fn export_dump_respects_stop_soc() {
        let mut o = outlet("hp", 1, Phase::L1, 2000.0);
        o.rules.export_enabled = true;
        o.rules.export_limit_w = 3000.0;
        let cfg = config(vec![o]);
        let mut ctl = OutletController::new();
        let mut s = snapshot(50.0);
        s.total_export_w = 3500.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::ExportDump);

        let mut ctl = OutletController::new();
        s.soc = 30.0;
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::WaitCharging);
    }

    #[test]
    fn total_load_budget_limits_switching() {
        let mut cfg = config(vec![
            outlet("a", 1, Phase::L1, 2000.0),
            outlet("b", 2, Phase::L2, 2000.0),
        ]);
        cfg.safety.max_total_load_w = Some(5000.0);
        let mut ctl = OutletController::new();
        let mut s = snapshot(90.0);
        s.phase_loads = [1000.0, 1000.0, 0.0];
        let cmds = run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        assert!(cmds[0].on);
        assert!(!cmds[1].on);
        assert_eq!(cmds[1].reason, DecisionReason::WaitHeadroom);
    }

    #[test]
    fn manual_outlet_counts_toward_headroom() {
        let cfg = config(vec![
            outlet("manual", 1, Phase::L1, 2000.0),
            outlet("auto", 2, Phase::L1, 2000.0),
        ]);
        let mut ctl = OutletController::new();
        let mut overrides = ManualOverrides::new();
        overrides.set("manual", OutletMode::Manual(true));
        let mut s = snapshot(90.0);
        s.phase_loads[0] = 1500.0; // 5500 spare before the manual outlet
        let cmds = run(&mut ctl, &s, &cfg, &overrides);
        assert!(cmds[0].on && cmds[0].manual);
        assert!(!cmds[1].on);
        assert_eq!(cmds[1].reason, DecisionReason::WaitHeadroom);
    }

    #[test]
    fn manual_mode_preserves_timers() {
        let cfg = config(vec![outlet("hp", 1, Phase::L1, 2000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("hp", true);
        let mut s = snapshot(80.0);
        s.voltages[0] = 205.0;
        run(&mut ctl, &s, &cfg, &ManualOverrides::new());
        let since = ctl.runtime("hp").unwrap().low_voltage_since;
        assert!(since.is_some());

        let mut overrides = ManualOverrides::new();
        overrides.set("hp", OutletMode::Manual(true));
        s.taken_at += Duration::from_secs(60);
        let cmds = run(&mut ctl, &s, &cfg, &overrides);
        assert!(cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::Manual);
        assert_eq!(ctl.runtime("hp").unwrap().low_voltage_since, since);
    }

    #[test]
    fn force_all_off_includes_manual_and_locks_out() {
        let cfg = config(vec![
            outlet("a", 1, Phase::L1, 1000.0),
            outlet("b", 2, Phase::L2, 1000.0),
        ]);
        let mut ctl = OutletController::new();
        ctl.seed("a", true);
        ctl.seed("b", true);
        let mut overrides = ManualOverrides::new();
        overrides.set("b", OutletMode::Manual(true));
        let cmds = ctl.force_all_off(&cfg, &overrides);
        assert!(cmds.iter().all(|c| !c.on));
        assert!(cmds[1].manual);
        assert!(ctl.runtime("a").unwrap().low_voltage_lockout);
    }

    #[test]
    fn critical_cutoff_spares_idle_outlets_from_lockout() {
        let cfg = config(vec![
            outlet("a", 1, Phase::L1, 1000.0),
            outlet("b", 2, Phase::L2, 1000.0),
        ]);
        let mut ctl = OutletController::new();
        ctl.seed("a", true);
        ctl.seed("b", false);
        ctl.force_all_off(&cfg, &ManualOverrides::new());
        assert!(ctl.runtime("a").unwrap().low_voltage_lockout);
        assert!(!ctl.runtime("b").unwrap().low_voltage_lockout);

        let cmds = run(&mut ctl, &snapshot(90.0), &cfg, &ManualOverrides::new());
        assert!(!cmds[0].on);
        assert_eq!(cmds[0].reason, DecisionReason::WaitLowVoltageRecovery);
        assert!(cmds[1].on);
        assert_eq!(cmds[1].reason, DecisionReason::SocStart);
    }

    #[test]
    fn removed_outlets_are_forgotten() {
        let mut cfg = config(vec![outlet("a", 1, Phase::L1, 1000.0)]);
        let mut ctl = OutletController::new();
        ctl.seed("gone", true);
        run(&mut ctl, &snapshot(50.0), &cfg, &ManualOverrides::new());
        assert!(ctl.runtime("gone").is_none());
        assert!(ctl.runtime("a").is_some());
        cfg.outlets.clear();
        run(&mut ctl, &snapshot(50.0), &cfg, &ManualOverrides::new());
        assert!(ctl.runtime("a").is_none());
    }
}
