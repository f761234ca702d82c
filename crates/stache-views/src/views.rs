//! Views that render templates into HTTP responses.
//!
//! [`TemplateView`] renders one view name with an attached
//! [`Engine`]. Success is a `200 text/html` response; any [`StacheError`]
//! becomes a response with the error's status code (always 500) and the
//! error message as a plain-text body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Response};
use http::{header, StatusCode};
use stache_core::StacheError;
use stache_template::context::{Context, ContextValue};
use stache_template::engine::Engine;

/// A view that renders a template.
///
/// # Examples
///
/// ```
/// use stache_views::views::TemplateView;
///
/// let view = TemplateView::new("home").with_context("title", serde_json::json!("Home"));
/// assert_eq!(view.view_name(), "home");
/// ```
#[derive(Clone)]
pub struct TemplateView {
    view: String,
    extra_context: HashMap<String, serde_json::Value>,
    engine: Option<Arc<Engine>>,
}

impl TemplateView {
    /// Creates a view that renders `view`.
    pub fn new(view: &str) -> Self {
        Self {
            view: view.to_string(),
            extra_context: HashMap::new(),
            engine: None,
        }
    }

    /// Attaches the engine used to render.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Adds a context value passed to every render of this view.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra_context.insert(key.to_string(), value);
        self
    }

    /// Selects the layout for this view (`None` for no layout).
    #[must_use]
    pub fn with_layout(self, layout: Option<&str>) -> Self {
        let value = layout.map_or(serde_json::Value::Null, |name| {
            serde_json::Value::String(name.to_string())
        });
        self.with_context("layout", value)
    }

    /// The view name.
    pub fn view_name(&self) -> &str {
        &self.view
    }

    /// Whether an engine is attached.
    pub const fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Builds the render context: the view's extra context overlaid by
    /// `request_context`.
    pub fn context_data(&self, request_context: HashMap<String, ContextValue>) -> Context {
        let mut ctx = Context::new();
        for (key, value) in &self.extra_context {
            ctx.set(key.clone(), ContextValue::from(value.clone()));
        }
        for (key, value) in request_context {
            ctx.set(key, value);
        }
        ctx
    }

    /// Renders the view into a response.
    pub async fn render(&self, request_context: HashMap<String, ContextValue>) -> Response {
        let Some(engine) = self.engine.as_deref() else {
            tracing::error!(view = %self.view, "no template engine attached to view");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "No template engine configured",
            )
                .into_response();
        };
        let mut ctx = self.context_data(request_context);
        render_to_response(engine, &self.view, &mut ctx).await
    }
}

impl std::fmt::Debug for TemplateView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateView")
            .field("view", &self.view)
            .field("extra_context", &self.extra_context)
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}

/// Renders `view` with `engine` and wraps the outcome in a response.
pub async fn render_to_response(engine: &Engine, view: &str, context: &mut Context) -> Response {
    match engine.render(view, context).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Maps an engine error to an HTTP response.
pub fn error_response(error: &StacheError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        error.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use stache_core::EngineConfig;
    use stache_template::source::MemorySource;

    use super::*;

    fn engine() -> Arc<Engine> {
        let source = Arc::new(MemorySource::new());
        source.insert("/views/partials/none.txt", "");
        source.insert("/views/home.hbs", "<h1>{{title}}</h1>");
        source.insert("/views/layouts/main.hbs", "<main>{{{body}}}</main>");
        Arc::new(Engine::with_source(EngineConfig::new("/views"), source).unwrap())
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_template_view_renders_html() {
        let view = TemplateView::new("home")
            .with_engine(engine())
            .with_context("title", serde_json::json!("Welcome"));
        let response = view.render(HashMap::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "<main><h1>Welcome</h1></main>");
    }

    #[tokio::test]
    async fn test_request_context_overrides_extra_context() {
        let view = TemplateView::new("home")
            .with_engine(engine())
            .with_context("title", serde_json::json!("Default"))
            .with_layout(None);
        let mut request = HashMap::new();
        request.insert("title".to_string(), ContextValue::from("Override"));

        let response = view.render(request).await;
        assert_eq!(body_string(response).await, "<h1>Override</h1>");
    }

    #[tokio::test]
    async fn test_missing_view_is_500() {
        let view = TemplateView::new("missing").with_engine(engine());
        let response = view.render(HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("missing.hbs"));
    }

    #[tokio::test]
    async fn test_view_without_engine_is_500() {
        let view = TemplateView::new("home");
        assert!(!view.has_engine());
        let response = view.render(HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(&StacheError::render("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
