//! Layout selection and path resolution.

use std::path::Path;

use stache_core::EngineConfig;

use crate::context::{Context, ContextValue};
use crate::source::TemplatePath;

/// Context key that selects the layout for one render.
pub const LAYOUT_KEY: &str = "layout";

/// Context key the rendered view is bound to when a layout wraps it.
pub const BODY_KEY: &str = "body";

/// The layout requested by a render context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutSelection {
    /// No `layout` key: use the configured default.
    Default,
    /// An explicit layout name.
    Named(String),
    /// Explicitly no layout (`null`, `false` or `""`).
    Disabled,
}

impl LayoutSelection {
    /// Reads the `layout` key of `context`.
    pub fn from_context(context: &Context) -> Self {
        match context.get(LAYOUT_KEY) {
            None | Some(ContextValue::Bool(true)) => Self::Default,
            Some(ContextValue::None | ContextValue::Bool(false)) => Self::Disabled,
            Some(value) => {
                let name = value.to_display_string();
                let name = name.trim();
                if name.is_empty() {
                    Self::Disabled
                } else {
                    Self::Named(name.to_string())
                }
            }
        }
    }

    /// The layout name to apply, if any.
    pub fn resolve(self, config: &EngineConfig) -> Option<String> {
        match self {
            Self::Default => config.default_layout().map(ToString::to_string),
            Self::Named(name) => Some(name),
            Self::Disabled => None,
        }
    }
}

/// Joins `name` under `dir`, appending the template extension when the
/// name does not already carry it.
pub fn template_path(dir: &Path, name: &str, config: &EngineConfig) -> TemplatePath {
    let extension = config.dotted_extension();
    if name.ends_with(&extension) {
        TemplatePath::new(dir.join(name))
    } else {
        TemplatePath::new(dir.join(format!("{name}{extension}")))
    }
}

/// `<view_path>/<layouts_folder>/<name>.<ext>`.
pub fn layout_path(view_path: &Path, name: &str, config: &EngineConfig) -> TemplatePath {
    template_path(&view_path.join(&config.layouts_folder), name, config)
}
