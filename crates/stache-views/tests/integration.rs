//! Integration tests for the HTTP adapter.
//!
//! Tests cover:
//! 1. A routed view renders through its layout into a 200 HTML response
//! 2. Query-string parameters reach the template
//! 3. Render failures become 500 responses
//! 4. Partials on disk are available to routed views

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use stache_core::{EngineConfig, Settings};
use stache_template::engine::Engine;
use stache_views::server::StacheApp;
use stache_views::views::TemplateView;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "partials/nav.hbs", "<nav>{{site}}</nav>");
    write(
        dir.path(),
        "layouts/main.hbs",
        "<html><head>{{{block \"head\"}}}</head>{{> nav}}{{{body}}}</html>",
    );
    write(
        dir.path(),
        "home.hbs",
        "{{#contentFor \"head\"}}<title>{{title}}</title>{{/contentFor}}<p>Hello {{query.name}}</p>",
    );
    write(dir.path(), "broken.hbs", "{{> missing}}");
    dir
}

fn app(dir: &Path) -> axum::Router {
    let mut settings = Settings::default();
    settings.engine = EngineConfig::new(dir);
    StacheApp::new(settings)
        .unwrap()
        .view(
            "/",
            TemplateView::new("home")
                .with_context("title", serde_json::json!("Home"))
                .with_context("site", serde_json::json!("Stache")),
        )
        .view("/broken", TemplateView::new("broken"))
        .into_axum_router()
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_routed_view_renders_with_layout() {
    let dir = site();
    let (status, body) = get(app(dir.path()), "/?name=Ann").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "<html><head><title>Home</title></head><nav>Stache</nav><p>Hello Ann</p></html>"
    );
}

#[tokio::test]
async fn test_query_values_are_escaped() {
    let dir = site();
    let (_, body) = get(app(dir.path()), "/?name=%3Cb%3E").await;
    assert!(body.contains("<p>Hello &lt;b&gt;</p>"));
}

#[tokio::test]
async fn test_render_failure_is_500() {
    let dir = site();
    let (status, body) = get(app(dir.path()), "/broken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("missing"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let dir = site();
    let (status, _) = get(app(dir.path()), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_shared_engine_serves_concurrent_requests() {
    let dir = site();
    let engine = Arc::new(Engine::new(EngineConfig::new(dir.path())).unwrap());
    let router = StacheApp::with_engine(Settings::default(), engine)
        .view("/", TemplateView::new("home").with_context("site", serde_json::json!("S")))
        .into_axum_router();

    let mut handles = Vec::new();
    for i in 0..10 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            get(router, &format!("/?name=user{i}")).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&format!("Hello user{i}")));
    }
}
