//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RoomcastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ROOMCAST_*` environment variable overrides
//! 4. Validate the result

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RoomcastSettings;

/// Resolve the default settings file path (`~/.roomcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roomcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoomcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unreadable or invalid file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoomcastSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RoomcastSettings> {
    let defaults = serde_json::to_value(RoomcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let raw = std::fs::read_to_string(path)?;
        deep_merge(defaults, serde_json::from_str::<Value>(&raw)?)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Merge `source` into `target`, returning the result.
///
/// Objects merge key by key (recursively); any other `source` value wins
/// outright. `null` in `source` keeps the `target` value, so a settings file
/// can mention a key without overriding its default.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut merged), Value::Object(overrides)) => {
            for (key, value) in overrides.into_iter().filter(|(_, v)| !v.is_null()) {
                let combined = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = merged.insert(key, combined);
            }
            Value::Object(merged)
        }
        (_, source) => source,
    }
}

/// Apply `ROOMCAST_*` environment variable overrides.
///
/// An unset variable leaves the field alone. A set but invalid value is
/// logged and ignored.
pub fn apply_env_overrides(settings: &mut RoomcastSettings) {
    let server = &mut settings.server;
    if let Some(v) = env_value("ROOMCAST_HOST", |v| Some(v.to_owned())) {
        server.host = v;
    }
    if let Some(v) = env_value("ROOMCAST_PORT", |v| {
        parse_in_range(v, 0u16, u16::MAX)
    }) {
        server.port = v;
    }
    if let Some(v) = env_value("ROOMCAST_MAX_SEND_QUEUE", |v| {
        parse_in_range(v, 1usize, 1_000_000)
    }) {
        server.max_send_queue = v;
    }
    if let Some(v) = env_value("ROOMCAST_SEND_TIMEOUT_MS", |v| {
        parse_in_range(v, 1u64, 600_000)
    }) {
        server.send_timeout_ms = v;
    }
    if let Some(v) = env_value("ROOMCAST_HEARTBEAT_INTERVAL_SECS", |v| {
        parse_in_range(v, 1u64, 3_600)
    }) {
        server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env_value("ROOMCAST_HEARTBEAT_TIMEOUT_SECS", |v| {
        parse_in_range(v, 1u64, 86_400)
    }) {
        server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env_value("ROOMCAST_MAX_MESSAGE_SIZE", |v| {
        parse_in_range(v, 1usize, 64 * 1024 * 1024)
    }) {
        server.max_message_size = v;
    }

    let logging = &mut settings.logging;
    if let Some(v) = env_value("ROOMCAST_LOG_LEVEL", |v| Some(v.to_owned())) {
        logging.level = v;
    }
    if let Some(v) = env_value("ROOMCAST_LOG_JSON", parse_bool) {
        logging.json = v;
    }
}

/// Parse a boolean flag: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and accept it only inside `min..=max`.
pub fn parse_in_range<T>(raw: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim()
        .parse::<T>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

/// Read `name` and run it through `parse`. Empty values count as unset.
fn env_value<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok().filter(|v| !v.is_empty())?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}
