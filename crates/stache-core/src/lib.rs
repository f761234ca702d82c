//! # stache-core
//!
//! Core types for stache: the error type, engine configuration, settings
//! loading, and logging setup. Every other crate in the workspace builds on
//! these.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine configuration and top-level settings
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{StacheError, StacheResult};
pub use settings::{EngineConfig, Settings};
