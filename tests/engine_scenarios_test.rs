use chrono::Utc;
use helios::config::{Config, OutletConfig, OutletRules, Phase, PlugEndpoint};
use helios::engine::{
    DecisionReason, EngineState, ManualOverrides, OutletMode, TelemetrySnapshot, run_cycle,
};
use std::time::{Duration, Instant};

fn outlet(id: &str, priority: u8, phase: Phase, rated_power_w: f64, rules: OutletRules) -> OutletConfig {
    OutletConfig {
        id: id.to_string(),
        name: id.to_string(),
        priority,
        phase,
        rated_power_w,
        endpoint: PlugEndpoint {
            host: "127.0.0.1".to_string(),
            ..PlugEndpoint::default()
        },
        rules,
    }
}

fn house() -> Config {
    let export_rules = OutletRules {
        export_enabled: true,
        export_limit_w: 5000.0,
        ..OutletRules::default()
    };
    Config {
        outlets: vec![
            outlet("heatpump", 2, Phase::L2, 3000.0, export_rules),
            outlet("boiler", 1, Phase::L1, 2000.0, OutletRules::default()),
        ],
        ..Config::default()
    }
}

fn reading(soc: f64, export_w: f64, at: Instant) -> TelemetrySnapshot {
    TelemetrySnapshot {
        soc,
        voltages: [240.0; 3],
        phase_loads: [300.0; 3],
        total_export_w: export_w,
        battery_power_w: 0.0,
        pv_power_w: export_w + 900.0,
        grid_power_w: -export_w,
        taken_at: at,
        wall_clock: Utc::now(),
    }
}

#[test]
fn sunny_day_boosts_then_recovers() {
    let cfg = house();
    let overrides = ManualOverrides::new();
    let mut state = EngineState::new();
    let t0 = Instant::now();

    let cmds = run_cycle(&reading(85.0, 7800.0, t0), &cfg, &overrides, &mut state);
    assert_eq!(cmds.charge.max_charge_amps, 110);
    assert_eq!(cmds.baseline_max_charge_amps, 100);
    assert_eq!(cmds.outlets[0].id, "boiler");
    assert!(cmds.is_on("boiler") && cmds.is_on("heatpump"));

    let cmds = run_cycle(
        &reading(86.0, 7700.0, t0 + Duration::from_secs(10)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert_eq!(cmds.charge.max_charge_amps, 110);
    assert_eq!(cmds.outlet("boiler").unwrap().reason, DecisionReason::Running);

    let cmds = run_cycle(
        &reading(86.0, 7700.0, t0 + Duration::from_secs(30)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert_eq!(cmds.charge.max_charge_amps, 120);

    // Inside the dead zone nothing moves
    let cmds = run_cycle(
        &reading(87.0, 7000.0, t0 + Duration::from_secs(90)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert_eq!(cmds.boost_amps, 20);

    let cmds = run_cycle(
        &reading(87.0, 6000.0, t0 + Duration::from_secs(120)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert_eq!(cmds.boost_amps, 10);
    assert_eq!(cmds.charge.max_charge_amps, 110);
}

#[test]
fn evening_discharge_stops_automatic_outlets_but_not_manual() {
    let cfg = house();
    let mut overrides = ManualOverrides::new();
    let mut state = EngineState::new();
    let t0 = Instant::now();

    run_cycle(&reading(90.0, 0.0, t0), &cfg, &overrides, &mut state);
    overrides.set("heatpump", OutletMode::Manual(true));

    let cmds = run_cycle(
        &reading(31.0, 0.0, t0 + Duration::from_secs(3600)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert!(!cmds.is_on("boiler"));
    assert_eq!(cmds.outlet("boiler").unwrap().reason, DecisionReason::BatteryLow);
    assert!(cmds.is_on("heatpump"));
    assert!(cmds.outlet("heatpump").unwrap().manual);
}

#[test]
fn export_dump_below_start_soc() {
    let cfg = house();
    let mut state = EngineState::new();
    let cmds = run_cycle(
        &reading(50.0, 5200.0, Instant::now()),
        &cfg,
        &ManualOverrides::new(),
        &mut state,
    );
    assert!(cmds.is_on("heatpump"));
    assert_eq!(cmds.outlet("heatpump").unwrap().reason, DecisionReason::ExportDump);
    assert!(!cmds.is_on("boiler"));
    assert_eq!(cmds.outlet("boiler").unwrap().reason, DecisionReason::WaitCharging);
}

#[test]
fn critical_undervoltage_then_recovery_gate() {
    let cfg = house();
    let overrides = ManualOverrides::new();
    let mut state = EngineState::new();
    let t0 = Instant::now();

    run_cycle(&reading(90.0, 0.0, t0), &cfg, &overrides, &mut state);

    let mut brownout = reading(90.0, 0.0, t0 + Duration::from_secs(1));
    brownout.voltages = [180.0, 231.0, 229.0];
    let cmds = run_cycle(&brownout, &cfg, &overrides, &mut state);
    assert!(cmds.critical);
    assert_eq!(cmds.charge.max_charge_amps, 0);
    assert_eq!(cmds.charge.grid_charge_amps, 0);
    assert!(cmds
        .outlets
        .iter()
        .all(|c| !c.on && c.reason == DecisionReason::CriticalUndervoltage));

    let cmds = run_cycle(
        &reading(90.0, 0.0, t0 + Duration::from_secs(2)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert!(!cmds.critical);
    assert!(!cmds.is_on("boiler"));
    assert_eq!(
        cmds.outlet("boiler").unwrap().reason,
        DecisionReason::WaitLowVoltageRecovery
    );

    let cmds = run_cycle(
        &reading(90.0, 0.0, t0 + Duration::from_secs(62)),
        &cfg,
        &overrides,
        &mut state,
    );
    assert!(cmds.is_on("boiler"));
}
