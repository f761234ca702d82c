//! # stache-template
//!
//! Template engine for stache. Turns a view name into a rendered page:
//! compiled templates are cached per path, partials are loaded once from
//! the configured folders, placeholder blocks carry content from a view into
//! its layout, and layouts wrap the rendered view.
//!
//! ## Modules
//!
//! - [`engine`] - The [`Engine`](engine::Engine) and the render pipeline
//! - [`cache`] - Compiled-template cache with coalesced misses
//! - [`partials`] - Partial discovery, naming and registration
//! - [`placeholders`] - Per-render named content blocks
//! - [`layout`] - Layout selection and path resolution
//! - [`source`] - Template storage (`TemplateSource`)
//! - [`lexer`] / [`parser`] - Template syntax
//! - [`render`] / [`helpers`] - Evaluation and built-in helpers
//! - [`context`] - Render context and values

pub mod cache;
pub mod context;
pub mod engine;
pub mod helpers;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod partials;
pub mod placeholders;
pub mod render;
pub mod source;

pub use context::{Context, ContextValue};
pub use engine::Engine;
