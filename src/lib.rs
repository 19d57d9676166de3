//! # Helios - Energy manager for Deye hybrid inverters
//!
//! Reads inverter telemetry over Modbus TCP, keeps the battery charge limits
//! in line with a time-of-day schedule, steps charge current up when grid
//! export or phase voltage runs high, and switches smart-plug outlets in
//! priority order so surplus solar power is consumed on site.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with serde defaults and validation
//! - `logging`: Structured logging and tracing
//! - `modbus`: Modbus TCP client with reconnect handling
//! - `inverter`: Deye register map, telemetry decoding and limit writes
//! - `plug`: HTTP relay smart plugs
//! - `controls`: Schedule, boost protection, safety supervisor, outlet rules
//! - `engine`: The pure per-cycle decision function
//! - `driver`: Control loop that wires the engine to real devices
//! - `web`: Status and override API

pub mod config;
pub mod controls;
pub mod driver;
pub mod engine;
pub mod error;
pub mod inverter;
pub mod logging;
pub mod modbus;
pub mod plug;
#[cfg(feature = "web")]
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use driver::EmsDriver;
pub use error::{HeliosError, Result};
