//! Settings for stache.
//!
//! [`EngineConfig`] holds everything the template engine needs to turn a view
//! name into a rendered page: where views live, which folders hold layouts
//! and partials, the file extension, the default layout, and whether compiled
//! templates are cached. [`Settings`] wraps it together with the logging
//! options used by [`crate::logging::setup_logging`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StacheError;

/// Template engine configuration.
///
/// # Examples
///
/// ```
/// use stache_core::settings::EngineConfig;
///
/// let config = EngineConfig::new("/srv/app/views");
/// assert_eq!(config.default_layout.as_deref(), Some("main"));
/// assert_eq!(config.file_extension, "hbs");
/// assert!(config.cache_templates);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base directory for views, layouts and partials. Required.
    #[serde(alias = "viewPath")]
    pub view_path: Option<PathBuf>,
    /// Layout applied when a render does not choose one. `None` or an empty
    /// string disables the default layout.
    #[serde(alias = "defaultLayout")]
    pub default_layout: Option<String>,
    /// One or more folders under `view_path` holding partials.
    #[serde(alias = "partialsFolder", deserialize_with = "one_or_many")]
    pub partials_folder: Vec<String>,
    /// Folder under `view_path` holding layouts.
    #[serde(alias = "layoutsFolder")]
    pub layouts_folder: String,
    /// Whether compiled templates are kept for the life of the engine.
    #[serde(alias = "cacheTemplates")]
    pub cache_templates: bool,
    /// Template file extension, without the leading dot.
    #[serde(alias = "fileExtension")]
    pub file_extension: String,
    /// Whether a layout may declare its own parent with `{{!< parent}}`.
    #[serde(alias = "chainLayouts")]
    pub chain_layouts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            view_path: None,
            default_layout: Some("main".to_string()),
            partials_folder: vec!["partials".to_string()],
            layouts_folder: "layouts".to_string(),
            cache_templates: true,
            file_extension: "hbs".to_string(),
            chain_layouts: false,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration rooted at `view_path` with default options.
    pub fn new(view_path: impl Into<PathBuf>) -> Self {
        Self {
            view_path: Some(view_path.into()),
            ..Self::default()
        }
    }

    /// Returns the view path, or a `ConfigError` if none was configured.
    pub fn require_view_path(&self) -> Result<&Path, StacheError> {
        match self.view_path.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(StacheError::ConfigError(
                "view_path is required but was not set".to_string(),
            )),
        }
    }

    /// Returns the effective default layout, treating an empty name as none.
    pub fn default_layout(&self) -> Option<&str> {
        self.default_layout
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Returns the extension with a leading dot, e.g. `.hbs`.
    pub fn dotted_extension(&self) -> String {
        format!(".{}", self.file_extension.trim_start_matches('.'))
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), StacheError> {
        self.require_view_path()?;
        if self.file_extension.trim_start_matches('.').is_empty() {
            return Err(StacheError::ConfigError(
                "file_extension must not be empty".to_string(),
            ));
        }
        if self.layouts_folder.is_empty() {
            return Err(StacheError::ConfigError(
                "layouts_folder must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The complete set of stache settings.
///
/// # Examples
///
/// ```
/// use stache_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.log_level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether debug mode is enabled. Selects pretty logs over JSON logs.
    pub debug: bool,
    /// The log level filter (e.g. "info", "stache_template=debug").
    pub log_level: String,
    /// Template engine configuration.
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

/// Accepts either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(folder) => vec![folder],
        OneOrMany::Many(folders) => folders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert!(config.view_path.is_none());
        assert_eq!(config.default_layout(), Some("main"));
        assert_eq!(config.partials_folder, vec!["partials".to_string()]);
        assert_eq!(config.layouts_folder, "layouts");
        assert!(config.cache_templates);
        assert_eq!(config.file_extension, "hbs");
        assert!(!config.chain_layouts);
    }

    #[test]
    fn test_missing_view_path_is_config_error() {
        let config = EngineConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StacheError::ConfigError(_)));
    }

    #[test]
    fn test_empty_view_path_is_config_error() {
        let config = EngineConfig::new("");
        assert!(config.require_view_path().is_err());
    }

    #[test]
    fn test_empty_default_layout_means_none() {
        let config = EngineConfig {
            default_layout: Some("  ".to_string()),
            ..EngineConfig::new("/views")
        };
        assert_eq!(config.default_layout(), None);
    }

    #[test]
    fn test_dotted_extension() {
        let mut config = EngineConfig::new("/views");
        assert_eq!(config.dotted_extension(), ".hbs");
        config.file_extension = ".html".to_string();
        assert_eq!(config.dotted_extension(), ".html");
    }

    #[test]
    fn test_partials_folder_accepts_single_string() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"view_path": "/v", "partials_folder": "shared"}"#).unwrap();
        assert_eq!(config.partials_folder, vec!["shared".to_string()]);
    }

    #[test]
    fn test_camel_case_aliases() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"viewPath": "/v", "defaultLayout": "site", "partialsFolder": ["a", "b"],
                "cacheTemplates": false, "fileExtension": "html"}"#,
        )
        .unwrap();
        assert_eq!(config.view_path, Some(PathBuf::from("/v")));
        assert_eq!(config.default_layout(), Some("site"));
        assert_eq!(config.partials_folder.len(), 2);
        assert!(!config.cache_templates);
        assert_eq!(config.file_extension, "html");
    }

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert!(s.engine.view_path.is_none());
    }
}
