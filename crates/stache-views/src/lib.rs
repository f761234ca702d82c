//! # stache-views
//!
//! axum integration for stache. A [`TemplateView`](views::TemplateView)
//! renders a view name through a shared [`Engine`](stache_template::Engine)
//! and [`StacheApp`](server::StacheApp) routes paths to views.
//!
//! Rendering errors become `500` responses; the engine itself never panics
//! past a render.

pub mod server;
pub mod views;
