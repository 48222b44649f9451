//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `~/.rideline/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ClientSettings;

/// Resolve the path to the settings file (`~/.rideline/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rideline").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RIDELINE_SERVER_URL") {
        settings.server.url = v;
    }

    // ── Transport ───────────────────────────────────────────────────
    if let Some(v) = read_env_u64("RIDELINE_RECONNECT_DELAY_MS", 100, 600_000) {
        settings.transport.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u32("RIDELINE_MAX_RECONNECT_ATTEMPTS", 1, u32::MAX) {
        settings.transport.max_reconnect_attempts = Some(v);
    }
    if let Some(v) = read_env_u64("RIDELINE_ACK_TIMEOUT_MS", 100, 600_000) {
        settings.transport.ack_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("RIDELINE_PING_INTERVAL_MS", 1_000, 600_000) {
        settings.transport.ping_interval_ms = v;
    }

    // ── Registration / location ─────────────────────────────────────
    if let Some(v) = read_env_u64("RIDELINE_REGISTER_COOLDOWN_MS", 0, 600_000) {
        settings.registration.cooldown_ms = v;
    }
    if let Some(v) = read_env_u64("RIDELINE_CACHE_MAX_AGE_MS", 0, 86_400_000) {
        settings.location.max_cache_age_ms = v;
    }
    if let Some(v) = read_env_u64("RIDELINE_UPDATE_INTERVAL_MS", 1_000, 3_600_000) {
        settings.location.update_interval_ms = v;
    }
    if let Some(v) = read_env_string("RIDELINE_CACHE_DIR") {
        settings.location.cache_dir = Some(v);
    }

    // ── Subscription ────────────────────────────────────────────────
    if let Some(v) = read_env_u64("RIDELINE_SUBSCRIBE_DEBOUNCE_MS", 0, 60_000) {
        settings.subscription.subscribe_debounce_ms = v;
    }
    if let Some(v) = read_env_u64("RIDELINE_UNSUBSCRIBE_DEBOUNCE_MS", 0, 60_000) {
        settings.subscription.unsubscribe_debounce_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RIDELINE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}
