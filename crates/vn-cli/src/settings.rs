use std::str::FromStr;

use log::LevelFilter;
use serde_json::{json, Map, Value as JsonValue};
use vn_core::config::{feature_key, get_u32, ConfigStore, LOG_LEVELS_KEY};

/// Set the level for one log target prefix in `log.levels`.
pub fn set_log_level(store: &dyn ConfigStore, prefix: &str, level: &str) -> Result<(), String> {
    let level = LevelFilter::from_str(level).map_err(|_| format!("Unknown log level '{}'", level))?;
    let mut levels = match store.get(LOG_LEVELS_KEY) {
        Some(JsonValue::Object(levels)) => levels,
        _ => Map::new(),
    };
    levels.insert(prefix.to_string(), json!(level.to_string().to_ascii_lowercase()));
    store
        .set(LOG_LEVELS_KEY, JsonValue::Object(levels))
        .map_err(|e| e.to_string())
}

/// Flip one bit of a feature group's disable mask. Returns the new mask.
pub fn set_feature(store: &dyn ConfigStore, group: &str, bit: u32, enabled: bool) -> Result<u32, String> {
    if bit >= 32 {
        return Err(format!("Feature bit {} out of range (0-31)", bit));
    }
    let key = feature_key(group);
    let mask = get_u32(store, &key).unwrap_or(0);
    let mask = if enabled { mask & !(1 << bit) } else { mask | (1 << bit) };
    store.set(&key, json!(mask)).map_err(|e| e.to_string())?;
    Ok(mask)
}

pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "enable" | "true" => Ok(true),
        "off" | "disable" | "false" => Ok(false),
        _ => Err(format!("Expected 'on' or 'off', got '{}'", value)),
    }
}
