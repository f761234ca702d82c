//! Core error types for stache.
//!
//! This module provides [`StacheError`], the single error type returned by
//! every fallible operation in the workspace: configuration, template
//! reading, compilation, rendering, and partial loading.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The primary error type for stache.
///
/// Per-request failures (`ReadError`, `CompileError`, `RenderError`) are
/// returned to the caller of a render and never abort the process. Setup
/// failures (`ConfigError`, `PartialLoadError`) are meant to stop startup.
///
/// Each variant maps to an HTTP status code via [`StacheError::status_code`].
#[derive(Error, Debug)]
pub enum StacheError {
    // ── Setup ────────────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A partial folder or partial file could not be loaded at startup.
    #[error("Failed to load partials from '{}': {message}", path.display())]
    PartialLoadError {
        /// The folder or file that failed.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    // ── Per request ──────────────────────────────────────────────────

    /// A template file is missing or unreadable.
    #[error("Failed to read template '{}': {source}", path.display())]
    ReadError {
        /// The template path that was read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A template contains invalid syntax.
    #[error("Template syntax error in '{path}': {message}")]
    CompileError {
        /// The template name or path.
        path: String,
        /// The syntax problem.
        message: String,
    },

    /// Rendering failed: a helper errored, a partial was missing, or the
    /// layout chain looped.
    #[error("Render error in '{path}': {message}")]
    RenderError {
        /// The template being rendered when the failure happened. Empty until
        /// the engine tags it.
        path: String,
        /// What went wrong.
        message: String,
    },
}

impl StacheError {
    /// Creates a `CompileError` for the given template.
    pub fn compile(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CompileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a `RenderError` that is not yet attributed to a template.
    pub fn render(message: impl Into<String>) -> Self {
        Self::RenderError {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Creates a `ReadError` for the given path.
    pub fn read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Attributes an untagged error to the template at `path`.
    ///
    /// Errors that already name a template keep the innermost one, so a
    /// failure inside a partial still points at the partial.
    #[must_use]
    pub fn in_template(self, path: impl AsRef<Path>) -> Self {
        match self {
            Self::RenderError { path: p, message } if p.is_empty() => Self::RenderError {
                path: path.as_ref().display().to_string(),
                message,
            },
            Self::CompileError { path: p, message } if p.is_empty() => Self::CompileError {
                path: path.as_ref().display().to_string(),
                message,
            },
            other => other,
        }
    }

    /// Returns an equivalent error. I/O sources keep their kind and message.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        match self {
            Self::ConfigError(message) => Self::ConfigError(message.clone()),
            Self::PartialLoadError { path, message } => Self::PartialLoadError {
                path: path.clone(),
                message: message.clone(),
            },
            Self::ReadError { path, source } => Self::ReadError {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::CompileError { path, message } => Self::compile(path.clone(), message.clone()),
            Self::RenderError { path, message } => Self::RenderError {
                path: path.clone(),
                message: message.clone(),
            },
        }
    }

    /// Returns `true` for errors that should abort startup.
    pub const fn is_setup_error(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::PartialLoadError { .. })
    }

    /// Returns the HTTP status code associated with this error.
    ///
    /// Every template failure is a server-side problem, so all variants map
    /// to 500.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ConfigError(_)
            | Self::PartialLoadError { .. }
            | Self::ReadError { .. }
            | Self::CompileError { .. }
            | Self::RenderError { .. } => 500,
        }
    }
}

/// A convenience type alias for `Result<T, StacheError>`.
pub type StacheResult<T> = Result<T, StacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_keeps_message() {
        let err = StacheError::read(
            "/v/a.hbs",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let copy = err.duplicate();
        assert_eq!(copy.to_string(), err.to_string());
        assert!(matches!(
            copy,
            StacheError::ReadError { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound
        ));

        let err = StacheError::PartialLoadError {
            path: PathBuf::from("/v/partials"),
            message: "missing".into(),
        };
        assert_eq!(err.duplicate().to_string(), err.to_string());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StacheError::ConfigError("x".into()).status_code(), 500);
        assert_eq!(StacheError::compile("a.hbs", "bad").status_code(), 500);
        assert_eq!(StacheError::render("boom").status_code(), 500);
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(StacheError::read("/v/a.hbs", io_err).status_code(), 500);
    }

    #[test]
    fn test_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = StacheError::read("/views/home.hbs", io_err);
        let msg = err.to_string();
        assert!(msg.contains("/views/home.hbs"));
        assert!(msg.contains("file missing"));
    }

    #[test]
    fn test_in_template_tags_untagged_render_error() {
        let err = StacheError::render("helper failed").in_template("/views/home.hbs");
        match err {
            StacheError::RenderError { path, message } => {
                assert_eq!(path, "/views/home.hbs");
                assert_eq!(message, "helper failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_in_template_keeps_innermost_path() {
        let err = StacheError::RenderError {
            path: "card".to_string(),
            message: "boom".to_string(),
        }
        .in_template("/views/home.hbs");
        assert!(err.to_string().contains("'card'"));
    }

    #[test]
    fn test_is_setup_error() {
        assert!(StacheError::ConfigError("x".into()).is_setup_error());
        assert!(StacheError::PartialLoadError {
            path: PathBuf::from("/views/partials"),
            message: "missing".into(),
        }
        .is_setup_error());
        assert!(!StacheError::render("x").is_setup_error());
    }
}
