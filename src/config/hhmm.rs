//! Serde adapter for `"HH:MM"` times of day.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

const FORMAT: &str = "%H:%M";

pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format(FORMAT).to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

/// Parse `"HH:MM"`, also accepting `"24:00"` as end of day (stored as 00:00)
pub fn parse(raw: &str) -> Result<NaiveTime, String> {
    let trimmed = raw.trim();
    if trimmed == "24:00" {
        return Ok(NaiveTime::MIN);
    }
    NaiveTime::parse_from_str(trimmed, FORMAT)
        .map_err(|e| format!("invalid time '{}', expected HH:MM: {}", raw, e))
}
