//! HTTP server integration for stache.
//!
//! [`StacheApp`] maps URL paths to [`TemplateView`]s and turns them into an
//! axum [`Router`](axum::Router). Query-string parameters are exposed to the
//! template as the `query` mapping.
//!
//! # Examples
//!
//! ```no_run
//! use stache_core::Settings;
//! use stache_views::server::StacheApp;
//! use stache_views::views::TemplateView;
//!
//! # async fn example() -> Result<(), stache_core::StacheError> {
//! let mut settings = Settings::default();
//! settings.engine.view_path = Some("views".into());
//!
//! let app = StacheApp::new(settings)?
//!     .view("/", TemplateView::new("home"))
//!     .view("/about", TemplateView::new("about"));
//!
//! app.run("0.0.0.0:8000").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use stache_core::{Settings, StacheError, StacheResult};
use stache_template::context::ContextValue;
use stache_template::engine::Engine;
use tower_http::trace::TraceLayer;

use crate::views::TemplateView;

/// A stache application: an engine plus routed views.
pub struct StacheApp {
    settings: Settings,
    engine: Arc<Engine>,
    routes: Vec<(String, TemplateView)>,
}

impl StacheApp {
    /// Creates an application whose engine is built from `settings`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the engine configuration is invalid.
    pub fn new(settings: Settings) -> StacheResult<Self> {
        let engine = Arc::new(Engine::from_settings(&settings)?);
        Ok(Self::with_engine(settings, engine))
    }

    /// Creates an application around an existing engine.
    pub fn with_engine(settings: Settings, engine: Arc<Engine>) -> Self {
        Self {
            settings,
            engine,
            routes: Vec::new(),
        }
    }

    /// Routes `path` to `view`. The application's engine is attached unless
    /// the view already has one.
    #[must_use]
    pub fn view(mut self, path: &str, view: TemplateView) -> Self {
        let view = if view.has_engine() {
            view
        } else {
            view.with_engine(Arc::clone(&self.engine))
        };
        self.routes.push((path.to_string(), view));
        self
    }

    /// The application settings.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The template engine.
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Number of routed views.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Converts the application into an axum router.
    pub fn into_axum_router(self) -> axum::Router {
        let mut router = axum::Router::new();
        for (path, view) in self.routes {
            let view = Arc::new(view);
            let handler = move |Query(query): Query<HashMap<String, String>>| {
                let view = Arc::clone(&view);
                async move {
                    let mut request_context = HashMap::new();
                    request_context.insert("query".to_string(), ContextValue::from(query));
                    view.render(request_context).await
                }
            };
            router = router.route(&path, get(handler));
        }
        router.layer(TraceLayer::new_for_http())
    }

    /// Loads partials and serves the application on `addr`.
    ///
    /// Partial loading happens before the listener binds, so a broken
    /// partial set stops startup.
    ///
    /// # Errors
    ///
    /// Returns `PartialLoadError` from partial loading and `ConfigError` if
    /// the address cannot be bound or the server fails.
    pub async fn run(self, addr: &str) -> Result<(), StacheError> {
        self.engine.preload().await?;

        let debug = self.settings.debug;
        let router = self.into_axum_router();
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            StacheError::ConfigError(format!("Failed to bind to {addr}: {e}"))
        })?;

        if debug {
            tracing::info!("Starting development server at http://{addr}/");
        }

        axum::serve(listener, router)
            .await
            .map_err(|e| StacheError::ConfigError(format!("Server error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_view_path() {
        let err = StacheApp::new(Settings::default()).err().unwrap();
        assert!(matches!(err, StacheError::ConfigError(_)));
    }

    #[test]
    fn test_view_attaches_engine() {
        let mut settings = Settings::default();
        settings.engine.view_path = Some("/views".into());
        let app = StacheApp::new(settings)
            .unwrap()
            .view("/", TemplateView::new("home"));
        assert_eq!(app.route_count(), 1);
        assert!(app.routes[0].1.has_engine());
    }
}
