//! Layered settings loading.
//!
//! Compiled defaults, then the user file deep-merged on top, then `BANTER_*`
//! environment overrides, then validation. In the merge, objects merge per
//! key, anything else in the file replaces the default, and `null` keeps the
//! default.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::BanterSettings;

/// `~/.banter/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".banter").join("settings.json")
}

/// Load from [`settings_path`].
pub fn load_settings() -> Result<BanterSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`. A missing file means defaults; unreadable JSON and
/// out-of-range values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<BanterSettings> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<BanterSettings> {
    let mut layered = serde_json::to_value(BanterSettings::default())?;
    if path.exists() {
        debug!(?path, "merging settings file");
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&raw)?;
        layered = deep_merge(layered, user);
    } else {
        debug!(?path, "no settings file, using defaults");
    }

    let mut settings: BanterSettings = serde_json::from_value(layered)?;
    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut merged), Value::Object(overrides)) => {
            for (key, value) in overrides.into_iter().filter(|(_, v)| !v.is_null()) {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (_, replacement) => replacement,
    }
}

/// Apply `BANTER_*` overrides read through `env`. Unparseable or
/// out-of-range values are logged and skipped.
pub fn apply_env_overrides(settings: &mut BanterSettings, env: impl Fn(&str) -> Option<String>) {
    let vars = EnvVars(env);

    if let Some(v) = vars.text("BANTER_BASE_URL") {
        settings.server.base_url = v;
    }
    if let Some(v) = vars.number("BANTER_MAX_ATTEMPTS", 1..=1000) {
        settings.connection.max_attempts = v;
    }
    if let Some(v) = vars.number("BANTER_HEARTBEAT_TOLERANCE_MS", 1000..=3_600_000) {
        settings.connection.heartbeat_tolerance_ms = v;
    }
    if let Some(v) = vars.number("BANTER_OVERLAY_DURATION_MS", 100..=600_000) {
        settings.overlay.display_duration_ms = v;
    }
    if let Some(v) = vars.flag("BANTER_AUTO_PLAY") {
        settings.overlay.auto_play = v;
    }
    if let Some(v) = vars.number("BANTER_VOLUME", 0..=100) {
        settings.overlay.volume = v;
    }
    if let Some(v) = vars.number("BANTER_SURFACE_PORT", 1..=u16::MAX) {
        settings.overlay.surface_port = v;
    }
    if let Some(v) = vars.number("BANTER_POLL_INTERVAL_MS", 1000..=3_600_000) {
        settings.dashboard.poll_interval_ms = v;
    }
    if let Some(v) = vars.text("BANTER_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `raw` as a number inside `range`.
pub fn parse_in_range<T>(raw: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvVars<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvVars<F> {
    fn text(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = (self.0)(key)?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            warn!(key, value = %raw, "ignoring env override, expected a boolean");
        }
        parsed
    }

    fn number<T>(&self, key: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd + Clone + std::fmt::Display,
    {
        let raw = (self.0)(key)?;
        let parsed = parse_in_range(&raw, range.clone());
        if parsed.is_none() {
            warn!(
                key,
                value = %raw,
                min = %range.start(),
                max = %range.end(),
                "ignoring env override, expected a number in range"
            );
        }
        parsed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Animation;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn merge_keeps_untouched_siblings() {
        let merged = deep_merge(
            json!({"overlay": {"volume": 80, "autoPlay": true}}),
            json!({"overlay": {"volume": 30}}),
        );
        assert_eq!(merged, json!({"overlay": {"volume": 30, "autoPlay": true}}));
    }

    #[test]
    fn merge_null_and_replacement_rules() {
        let merged = deep_merge(
            json!({"a": 1, "b": {"nested": true}, "c": [1, 2]}),
            json!({"a": null, "b": 42, "c": [3]}),
        );
        assert_eq!(merged, json!({"a": 1, "b": 42, "c": [3]}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), env(&[])).unwrap();
        assert_eq!(settings, BanterSettings::default());
    }

    #[test]
    fn file_values_layer_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"server": {"baseUrl": "https://banter.example"}, "overlay": {"animation": "slide", "displayDurationMs": 8000}}"#,
        );
        let settings = load_with_env(&path, env(&[])).unwrap();
        assert_eq!(settings.server.base_url, "https://banter.example");
        assert_eq!(settings.server.socket_path, "/ws");
        assert_eq!(settings.overlay.animation, Animation::Slide);
        assert_eq!(settings.overlay.display_duration_ms, 8000);
        assert!(settings.overlay.auto_play);
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"overlay": {"volume": 40, "autoPlay": true}}"#);
        let settings = load_with_env(
            &path,
            env(&[
                ("BANTER_VOLUME", "65"),
                ("BANTER_AUTO_PLAY", "off"),
                ("BANTER_SURFACE_PORT", "5000"),
                ("BANTER_MAX_ATTEMPTS", "3"),
                ("BANTER_LOG_LEVEL", "banter_socket=debug,info"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.overlay.volume, 65);
        assert!(!settings.overlay.auto_play);
        assert_eq!(settings.overlay.surface_port, 5000);
        assert_eq!(settings.connection.max_attempts, 3);
        assert_eq!(settings.logging.level, "banter_socket=debug,info");
    }

    #[test]
    fn bad_env_values_are_skipped() {
        let mut settings = BanterSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("BANTER_VOLUME", "150"),
                ("BANTER_AUTO_PLAY", "maybe"),
                ("BANTER_POLL_INTERVAL_MS", "soon"),
                ("BANTER_BASE_URL", ""),
            ]),
        );
        assert_eq!(settings, BanterSettings::default());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "not valid json");
        assert_matches!(load_with_env(&path, env(&[])), Err(SettingsError::Json(_)));
    }

    #[test]
    fn out_of_range_file_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"connection": {"maxAttempts": 0}}"#);
        assert_matches!(
            load_with_env(&path, env(&[])),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("maxAttempts")
        );
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            load_with_env(dir.path(), env(&[])),
            Err(SettingsError::Read { path, .. }) if path == dir.path()
        );
    }

    #[test]
    fn parsers() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_in_range::<u16>("4455", 1..=u16::MAX), Some(4455));
        assert_eq!(parse_in_range::<u16>("0", 1..=u16::MAX), None);
        assert_eq!(parse_in_range::<u8>("101", 0..=100), None);
        assert_eq!(parse_in_range::<u64>("abc", 0..=100), None);
    }
}
