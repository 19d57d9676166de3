use super::*;

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.1.122".to_string(),
            port: 502,
            unit_id: 1,
            connect_timeout_ms: 5000,
            operation_timeout_ms: 2000,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for RegistersConfig {
    fn default() -> Self {
        Self {
            telemetry_start: 588,
            telemetry_count: 90,
            soc_offset: 0,
            battery_power_offset: 2,
            grid_power_offset: 37,
            voltage_offset: 56,
            phase_load_offset: 62,
            pv_power_offsets: vec![84, 85],
            voltage_scale: 0.1,
            max_charge_amps: 108,
            max_discharge_amps: 109,
            grid_charge_current: 128,
            max_sell_power: 340,
            sell_power_width: RegisterWidth::Single,
            sell_power_scale: 1.0,
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            max_charge_amps_limit: 185,
            max_discharge_amps: None,
            sell_power_limit_w: None,
            charge_refresh_secs: 60,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_max_charge_amps: 100,
            default_grid_charge_amps: 0,
            windows: Vec::new(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
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
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            critical_voltage: 185.0,
            phase_max_w: 7000.0,
            max_total_load_w: None,
        }
    }
}

impl Default for PlugEndpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
            channel: 0,
            username: None,
            password: None,
            timeout_ms: 3000,
        }
    }
}

impl Default for OutletRules {
    fn default() -> Self {
        Self {
            start_soc: 70.0,
            stop_soc: 32.0,
            headroom_w: 4000.0,
            hv_threshold: 252.0,
            lv_threshold: 210.0,
            lv_delay_secs: 10,
            lv_recovery_voltage: 220.0,
            lv_recovery_delay_secs: 60,
            soc_enabled: true,
            voltage_enabled: true,
            export_enabled: false,
            export_limit_w: 5000.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inverter: InverterConfig::default(),
            registers: RegistersConfig::default(),
            hardware: HardwareConfig::default(),
            schedule: ScheduleConfig::default(),
            protection: ProtectionConfig::default(),
            safety: SafetyConfig::default(),
            outlets: Vec::new(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            poll_interval_ms: 1000,
            timezone: "UTC".to_string(),
        }
    }
}
