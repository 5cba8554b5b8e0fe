//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TaskerSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TASKER_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TaskerSettings;

/// Settings file used when `TASKER_CONFIG` is unset.
pub const DEFAULT_SETTINGS_FILE: &str = "tasker.json";

/// Resolve the settings file path from `TASKER_CONFIG`.
pub fn settings_path() -> PathBuf {
    read_env_string("TASKER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaskerSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TaskerSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults with the file at `path` merged on top. No env overrides.
pub fn read_settings_file(path: &Path) -> Result<TaskerSettings> {
    let defaults = serde_json::to_value(TaskerSettings::default())?;

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
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TASKER_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TaskerSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and ignored.
pub fn apply_overrides<F>(settings: &mut TaskerSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TASKER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TASKER_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("TASKER_DB_PATH") {
        settings.database.path = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TASKER_SIGNING_SECRET") {
        settings.auth.signing_secret = Some(v);
    }
    if let Some(v) = env.u64("TASKER_TOKEN_TTL_SECS", 1, 31_536_000) {
        settings.auth.token_ttl_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TASKER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TASKER_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject settings no component can run with.
pub fn validate(settings: &TaskerSettings) -> Result<()> {
    if settings.auth.token_ttl_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "auth.token_ttl_secs must be positive".into(),
        ));
    }
    let pw = &settings.auth.password;
    if pw.iterations == 0 || pw.parallelism == 0 || pw.memory_kib < 8 * pw.parallelism {
        return Err(SettingsError::InvalidValue(format!(
            "auth.password: iterations and parallelism must be positive and memory_kib at least {}",
            8 * pw.parallelism.max(1)
        )));
    }
    if settings
        .auth
        .signing_secret
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        return Err(SettingsError::InvalidValue(
            "auth.signing_secret must not be blank".into(),
        ));
    }
    if settings.database.path.trim().is_empty() {
        return Err(SettingsError::InvalidValue("database.path must not be empty".into()));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
