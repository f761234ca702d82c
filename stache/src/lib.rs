//! # stache
//!
//! Handlebars-style view rendering with layouts, partials and placeholder
//! blocks.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on `stache`
//! to get everything, or on individual crates for finer-grained control.
//!
//! ```
//! use std::sync::Arc;
//! use stache::prelude::*;
//! use stache::template::source::MemorySource;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let source = Arc::new(MemorySource::new());
//! source.insert("/views/partials/card.hbs", "<b>{{name}}</b>");
//! source.insert("/views/home.hbs", "{{> card}}");
//! source.insert("/views/layouts/main.hbs", "<main>{{{body}}}</main>");
//!
//! let engine = Engine::with_source(EngineConfig::new("/views"), source).unwrap();
//! let mut ctx = Context::from_json(serde_json::json!({"name": "Ann"}));
//! assert_eq!(engine.render("home", &mut ctx).await.unwrap(), "<main><b>Ann</b></main>");
//! # });
//! ```

/// Error types, engine configuration, settings loading and logging.
pub use stache_core as core;

/// The template engine: cache, partials, placeholders and layouts.
pub use stache_template as template;

/// axum integration.
#[cfg(feature = "views")]
pub use stache_views as views;

/// The types most applications need.
pub mod prelude {
    pub use stache_core::{EngineConfig, Settings, StacheError, StacheResult};
    pub use stache_template::context::{Context, ContextValue};
    pub use stache_template::engine::Engine;
    pub use stache_template::helpers::HelperCall;

    #[cfg(feature = "views")]
    pub use stache_views::{server::StacheApp, views::TemplateView};
}
