//! Layered settings: compiled defaults, then `~/.alpha/settings.json`, then
//! `ALPHA_*` environment variables.
//!
//! The file is merged key by key into the defaults, so a file that only sets
//! `client.serverUrl` keeps every other default. A `null` in the file leaves
//! the default untouched; arrays and scalars replace it.

use std::path::{Path, PathBuf};

use alpha_core::InstallationId;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{alpha_home, AlphaSettings};

pub fn settings_path() -> PathBuf {
    alpha_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AlphaSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AlphaSettings> {
    let mut settings = load_file_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layers(path: &Path) -> Result<AlphaSettings> {
    let defaults = serde_json::to_value(AlphaSettings::default())?;

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

/// Merge `source` over `target`, recursing into objects.
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

/// Apply `ALPHA_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut AlphaSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are ignored with a
/// warning and leave the file/default value in place.
pub fn apply_overrides_from<F>(settings: &mut AlphaSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let u16_in = |name: &str, min: u16, max: u16| -> Option<u16> {
        let val = lookup(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    };
    let bool_of = |name: &str| -> Option<bool> {
        let val = lookup(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    };

    // ── Identity ────────────────────────────────────────────────────
    if let Some(v) = string("ALPHA_INSTALLATION_ID") {
        settings.installation_id = InstallationId::new(v);
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = string("ALPHA_SERVER_URL") {
        settings.client.server_url = Some(v);
    }
    if let Some(v) = string("ALPHA_MODEL") {
        settings.client.model = v.clone();
        settings.server.chat.model = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("ALPHA_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = u16_in("ALPHA_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = string("ALPHA_DATABASE") {
        settings.server.database_path = Some(v);
    }
    if let Some(v) = string("ALPHA_CHAT_BASE_URL") {
        settings.server.chat.base_url = v;
    }
    if let Some(v) = string("ALPHA_CHAT_API_KEY") {
        settings.server.chat.api_key = Some(v);
    }
    if let Some(v) = string("ALPHA_TRANSCRIBE_API_KEY") {
        settings.server.transcription.api_key = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("ALPHA_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = bool_of("ALPHA_LOG_JSON") {
        settings.logging.json = v;
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_keeps_sibling_defaults() {
        let defaults = serde_json::json!({"client": {"autosaveDelayMs": 2000, "model": "gpt-4o"}});
        let file = serde_json::json!({"client": {"model": "gpt-4o-mini"}});
        let merged = deep_merge(defaults, file);
        assert_eq!(merged["client"]["model"], "gpt-4o-mini");
        assert_eq!(merged["client"]["autosaveDelayMs"], 2000);
    }

    #[test]
    fn merge_skips_nulls_and_replaces_scalars() {
        let defaults = serde_json::json!({"client": {"serverUrl": "http://a"}, "logging": {"json": false}});
        let file = serde_json::json!({"client": {"serverUrl": null}, "logging": {"json": true}});
        let merged = deep_merge(defaults, file);
        assert_eq!(merged["client"]["serverUrl"], "http://a");
        assert_eq!(merged["logging"]["json"], true);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layers(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.client.autosave_delay_ms, 2000);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"installationId": "laptop", "client": {"serverUrl": "http://localhost:3000"}, "profile": {"userName": "Sam"}}"#,
        )
        .unwrap();

        let settings = load_file_layers(&path).unwrap();
        assert_eq!(settings.installation_id.as_str(), "laptop");
        assert_eq!(settings.client.server_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(settings.client.autosave_delay_ms, 2000);
        assert_eq!(settings.profile.user_name, "Sam");
        assert_eq!(settings.profile.assistant_name, "Alpha");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"client": {"autosaveDelayMs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut s = AlphaSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("ALPHA_SERVER_URL", "http://alpha.local"),
                ("ALPHA_PORT", "8080"),
                ("ALPHA_INSTALLATION_ID", "desk"),
                ("ALPHA_CHAT_API_KEY", "sk-test"),
                ("ALPHA_MODEL", "gpt-4o-mini"),
                ("ALPHA_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(s.client.server_url.as_deref(), Some("http://alpha.local"));
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.installation_id.as_str(), "desk");
        assert_eq!(s.server.chat.api_key.as_deref(), Some("sk-test"));
        assert_eq!(s.client.model, "gpt-4o-mini");
        assert_eq!(s.server.chat.model, "gpt-4o-mini");
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut s = AlphaSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[("ALPHA_PORT", "99999"), ("ALPHA_LOG_JSON", "maybe"), ("ALPHA_HOST", "")]),
        );
        assert_eq!(s.server.port, 3000);
        assert!(!s.logging.json);
        assert_eq!(s.server.host, "127.0.0.1");
    }

    #[test]
    fn parse_bool_is_case_insensitive() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn port_must_be_nonzero() {
        assert_eq!(parse_u16_range("3000", 1, 65535), Some(3000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("http", 1, 65535), None);
    }
}
