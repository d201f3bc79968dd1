//! Turning `~/.cadence/settings.json` and the `CADENCE_*` environment into
//! one validated [`CadenceSettings`].
//!
//! The file only needs the keys it changes; everything else keeps its
//! compiled default. Environment values win over the file, and a value that
//! does not parse is logged and skipped rather than failing the load.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::CadenceSettings;

/// Resolve the path to the settings file (`~/.cadence/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cadence").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CadenceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CadenceSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<CadenceSettings> {
    if !path.exists() {
        debug!(?path, "no settings file, using defaults");
        return Ok(CadenceSettings::default());
    }

    debug!(?path, "loading settings file");
    let defaults = serde_json::to_value(CadenceSettings::default())?;
    let parse_error = |source: serde_json::Error| SettingsError::Parse {
        path: path.to_owned(),
        source,
    };
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_owned(),
        source,
    })?;
    let user: Value = serde_json::from_str(&content).map_err(parse_error)?;
    serde_json::from_value(deep_merge(defaults, user)).map_err(parse_error)
}

/// Lay `overlay` over `base`. Objects combine key by key at every depth;
/// any other overlay value replaces what it lands on, except `null`, which
/// leaves it alone.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    overlay_onto(&mut base, overlay);
    base
}

fn overlay_onto(slot: &mut Value, overlay: Value) {
    match (slot, overlay) {
        (_, Value::Null) => {}
        (Value::Object(fields), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match fields.get_mut(&key) {
                    Some(existing) => overlay_onto(existing, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = fields.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `CADENCE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CadenceSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any name → value lookup.
///
/// Out-of-range or unparsable values are warned about and ignored.
pub fn apply_overrides(settings: &mut CadenceSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_u64 = |name: &str, min: u64, max: u64| {
        let val = read(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        parsed
    };

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = read("CADENCE_WS_URL") {
        settings.channel.url = v;
    }
    if let Some(v) = read_u64("CADENCE_RECONNECT_ATTEMPTS", 0, 100).and_then(|v| u32::try_from(v).ok()) {
        settings.channel.reconnect_attempts = v;
    }
    if let Some(v) = read_u64("CADENCE_RECONNECT_DELAY_MS", 10, 600_000) {
        settings.channel.reconnect_delay_ms = v;
    }
    if let Some(v) = read_u64("CADENCE_HEARTBEAT_MS", 1000, 600_000) {
        settings.channel.heartbeat_interval_ms = v;
    }

    // ── REST API ────────────────────────────────────────────────────
    if let Some(v) = read("CADENCE_API_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = read_u64("CADENCE_API_TIMEOUT_MS", 1000, 600_000) {
        settings.api.timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("CADENCE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(val) = read("CADENCE_LOG_JSON") {
        match parse_bool(&val) {
            Some(v) => settings.logging.json = v,
            None => warn!(key = "CADENCE_LOG_JSON", value = %val, "invalid boolean env var, ignoring"),
        }
    }
}

/// Reject merged settings that cannot possibly work.
pub fn validate(settings: &CadenceSettings) -> Result<()> {
    let url = &settings.channel.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(SettingsError::Invalid {
            field: "channel.url",
            reason: format!("must use ws:// or wss://, got {url}"),
        });
    }
    let api = &settings.api.base_url;
    if !(api.starts_with("http://") || api.starts_with("https://")) {
        return Err(SettingsError::Invalid {
            field: "api.baseUrl",
            reason: format!("must use http:// or https://, got {api}"),
        });
    }
    if settings.channel.send_queue == 0 {
        return Err(SettingsError::Invalid {
            field: "channel.sendQueue",
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"channel": {"url": "ws://a", "sendQueue": 64}});
        let source = serde_json::json!({"channel": {"url": "ws://b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["channel"]["url"], "ws://b");
        assert_eq!(merged["channel"]["sendQueue"], 64);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_null_adds_nothing() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": null}));
        assert_eq!(merged, serde_json::json!({"a": 1}));
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_layered(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, CadenceSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"channel": {"reconnectAttempts": 2, "url": "wss://worker.example/ws"}}"#,
        )
        .unwrap();

        let settings = read_layered(&path).unwrap();
        assert_eq!(settings.channel.reconnect_attempts, 2);
        assert_eq!(settings.channel.url, "wss://worker.example/ws");
        assert_eq!(settings.channel.reconnect_delay_ms, 1000);
        assert_eq!(settings.api, crate::ApiSettings::default());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn wrongly_typed_value_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"channel": {"reconnectAttempts": "many"}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn bad_url_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"channel": {"url": "http://nope"}}"#).unwrap();
        let settings = read_layered(&path).unwrap();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::Invalid { field: "channel.url", .. })
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_in_range_values() {
        let mut settings = CadenceSettings::default();
        apply_overrides(
            &mut settings,
            lookup(&[
                ("CADENCE_WS_URL", "ws://10.0.0.2:8000/ws"),
                ("CADENCE_RECONNECT_ATTEMPTS", "3"),
                ("CADENCE_RECONNECT_DELAY_MS", "250"),
                ("CADENCE_API_URL", "http://10.0.0.2:8000/api"),
                ("CADENCE_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.channel.url, "ws://10.0.0.2:8000/ws");
        assert_eq!(settings.channel.reconnect_attempts, 3);
        assert_eq!(settings.channel.reconnect_delay_ms, 250);
        assert_eq!(settings.api.base_url, "http://10.0.0.2:8000/api");
        assert!(settings.logging.json);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = CadenceSettings::default();
        apply_overrides(
            &mut settings,
            lookup(&[
                ("CADENCE_RECONNECT_ATTEMPTS", "many"),
                ("CADENCE_RECONNECT_DELAY_MS", "1"),
                ("CADENCE_LOG_JSON", "perhaps"),
                ("CADENCE_WS_URL", ""),
            ]),
        );
        assert_eq!(settings, CadenceSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("1000", 10, 600_000), Some(1000));
        assert_eq!(parse_u64_range("5", 10, 600_000), None);
        assert_eq!(parse_u64_range("700000", 10, 600_000), None);
        assert_eq!(parse_u64_range("abc", 10, 600_000), None);
    }
}
