#![no_main]
use helios::config::RegistersConfig;
use helios::inverter::decode_telemetry;
use libfuzzer_sys::fuzz_target;
use std::time::Instant;

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a big-endian register stream
    let regs: Vec<u16> = data
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();

    let cfg = RegistersConfig::default();
    if let Ok(s) = decode_telemetry(&regs, &cfg, Instant::now(), chrono::Utc::now()) {
        assert!((0.0..=100.0).contains(&s.soc));
        assert!(s.total_export_w >= 0.0);
    }
});
