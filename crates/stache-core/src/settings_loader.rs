//! Settings loading from configuration files.
//!
//! This module loads [`Settings`] from TOML or JSON and applies environment
//! variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! Keys may be written in `snake_case` or in the `camelCase` spelling used by
//! JavaScript view engines (`defaultLayout`, `partialsFolder`, ...).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `STACHE_DEBUG` | `debug` |
//! | `STACHE_LOG_LEVEL` | `log_level` |
//! | `STACHE_VIEW_PATH` | `engine.view_path` |
//! | `STACHE_DEFAULT_LAYOUT` | `engine.default_layout` (empty = none) |
//! | `STACHE_LAYOUTS_FOLDER` | `engine.layouts_folder` |
//! | `STACHE_PARTIALS_FOLDER` | `engine.partials_folder` (comma-separated) |
//! | `STACHE_CACHE_TEMPLATES` | `engine.cache_templates` |
//! | `STACHE_FILE_EXTENSION` | `engine.file_extension` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use stache_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/stache.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::StacheError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, StacheError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| StacheError::ConfigError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, StacheError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        StacheError::ConfigError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, StacheError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, StacheError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| StacheError::ConfigError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, StacheError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        StacheError::ConfigError(format!(
            "Failed to read JSON file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `STACHE_*` environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("STACHE_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("STACHE_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("STACHE_VIEW_PATH") {
        settings.engine.view_path = Some(PathBuf::from(val));
    }

    if let Ok(val) = std::env::var("STACHE_DEFAULT_LAYOUT") {
        settings.engine.default_layout = if val.trim().is_empty() {
            None
        } else {
            Some(val)
        };
    }

    if let Ok(val) = std::env::var("STACHE_LAYOUTS_FOLDER") {
        settings.engine.layouts_folder = val;
    }

    if let Ok(val) = std::env::var("STACHE_PARTIALS_FOLDER") {
        settings.engine.partials_folder = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Ok(val) = std::env::var("STACHE_CACHE_TEMPLATES") {
        settings.engine.cache_templates = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("STACHE_FILE_EXTENSION") {
        settings.engine.file_extension = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, StacheError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        StacheError::ConfigError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, normalize_keys(value));
    serde_json::from_value(merged).map_err(|e| {
        StacheError::ConfigError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Rewrites `camelCase` object keys to `snake_case` so they merge with the
/// serialized defaults instead of colliding with them.
fn normalize_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (to_snake_case(&k), normalize_keys(v)))
                .collect(),
        ),
        other => other,
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            log_level = "warn"

            [engine]
            view_path = "/srv/views"
            default_layout = "site"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.engine.view_path, Some(PathBuf::from("/srv/views")));
        assert_eq!(settings.engine.default_layout(), Some("site"));
        // Defaults preserved
        assert_eq!(settings.engine.layouts_folder, "layouts");
        assert!(settings.engine.cache_templates);
    }

    #[test]
    fn test_from_toml_str_camel_case_keys() {
        let toml = r#"
            [engine]
            viewPath = "/srv/views"
            partialsFolder = ["partials", "components"]
            cacheTemplates = false
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.engine.view_path, Some(PathBuf::from("/srv/views")));
        assert_eq!(settings.engine.partials_folder.len(), 2);
        assert!(!settings.engine.cache_templates);
    }

    #[test]
    fn test_from_toml_str_empty_layout_disables_default() {
        let settings = from_toml_str("[engine]\ndefault_layout = \"\"").unwrap();
        assert_eq!(settings.engine.default_layout(), None);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert!(settings.engine.view_path.is_none());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(StacheError::ConfigError(_))));
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "log_level": "debug",
            "engine": {"viewPath": "/v", "fileExtension": "html", "defaultLayout": null}
        }"#;

        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.engine.file_extension, "html");
        assert_eq!(settings.engine.default_layout(), None);
    }

    #[test]
    fn test_from_json_str_single_partials_folder() {
        let settings = from_json_str(r#"{"engine": {"partials_folder": "shared"}}"#).unwrap();
        assert_eq!(settings.engine.partials_folder, vec!["shared".to_string()]);
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stache.toml");
        std::fs::write(&path, "[engine]\nview_path = \"/from/file\"\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.engine.view_path, Some(PathBuf::from("/from/file")));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stache.json");
        std::fs::write(&path, r#"{"debug": false}"#).unwrap();

        let settings = from_json_file(&path).unwrap();
        assert!(!settings.debug);
    }

    #[test]
    fn test_from_toml_file_missing() {
        assert!(from_toml_file("/nonexistent/path/stache.toml").is_err());
    }

    // ── Environment variable overrides ──────────────────────────────
    //
    // All env mutations live in one test so parallel tests never observe
    // each other's variables.

    #[test]
    fn test_apply_env_overrides() {
        std::env::set_var("STACHE_VIEW_PATH", "/env/views");
        std::env::set_var("STACHE_DEFAULT_LAYOUT", "");
        std::env::set_var("STACHE_PARTIALS_FOLDER", "partials, widgets");
        std::env::set_var("STACHE_CACHE_TEMPLATES", "0");
        std::env::set_var("STACHE_DEBUG", "false");

        let settings = from_env();
        assert_eq!(settings.engine.view_path, Some(PathBuf::from("/env/views")));
        assert_eq!(settings.engine.default_layout(), None);
        assert_eq!(
            settings.engine.partials_folder,
            vec!["partials".to_string(), "widgets".to_string()]
        );
        assert!(!settings.engine.cache_templates);
        assert!(!settings.debug);

        for key in [
            "STACHE_VIEW_PATH",
            "STACHE_DEFAULT_LAYOUT",
            "STACHE_PARTIALS_FOLDER",
            "STACHE_CACHE_TEMPLATES",
            "STACHE_DEBUG",
        ] {
            std::env::remove_var(key);
        }
    }

    // ── helpers ─────────────────────────────────────────────────────

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}});
        let over = serde_json::json!({"outer": {"b": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 3);
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("defaultLayout"), "default_layout");
        assert_eq!(to_snake_case("view_path"), "view_path");
        assert_eq!(to_snake_case("viewPath"), "view_path");
    }
}
