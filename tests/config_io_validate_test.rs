use helios::config::{Config, OutletConfig, Phase, PlugEndpoint, RegisterWidth};
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.inverter.ip = "10.0.0.5".to_string();
    cfg.registers.sell_power_width = RegisterWidth::Double;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();
    cfg.outlets.push(OutletConfig {
        id: "boiler".to_string(),
        name: "Boiler".to_string(),
        priority: 1,
        phase: Phase::L3,
        rated_power_w: 2400.0,
        endpoint: PlugEndpoint {
            host: "10.0.0.30".to_string(),
            ..PlugEndpoint::default()
        },
        rules: Default::default(),
    });

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::load_validated(&path).unwrap();

    assert_eq!(loaded.inverter.ip, "10.0.0.5");
    assert_eq!(loaded.registers.sell_power_width, RegisterWidth::Double);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert_eq!(loaded.outlet("boiler").map(|o| o.phase), Some(Phase::L3));
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    cfg.inverter.ip.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.protection.recovery_threshold_pct = cfg.protection.power_threshold_pct;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.protection.voltage_recovery = cfg.protection.voltage_warning;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.safety.phase_max_w = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.registers.voltage_offset = cfg.registers.telemetry_count - 1;
    assert!(cfg.validate().is_err());
}

#[test]
fn overlapping_windows_are_rejected() {
    let yaml = r#"
schedule:
  enabled: true
  windows:
    - start: "22:00"
      end: "02:00"
      max_charge_amps: 100
      grid_charge_amps: 20
    - start: "01:00"
      end: "05:00"
      max_charge_amps: 100
      grid_charge_amps: 20
"#;
    let cfg: Config = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("overlap"));
}

#[test]
fn invalid_time_of_day_fails_to_parse() {
    let yaml = r#"
schedule:
  windows:
    - start: "25:00"
      end: "02:00"
      max_charge_amps: 100
      grid_charge_amps: 20
"#;
    assert!(serde_yaml::from_str::<Config>(yaml).is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{}", err).contains("I/O error"));
}

#[test]
fn shipped_example_is_valid() {
    let cfg: Config = serde_yaml::from_str(include_str!("../helios.example.yaml")).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.outlets.len(), 2);
    assert_eq!(cfg.schedule.windows[1].days, vec![5, 6]);
}
