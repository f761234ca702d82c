//! Template engine: view resolution, layouts and the render pipeline.
//!
//! The [`Engine`] owns the compiled-template cache, the partial registry and
//! the helper registry. One render:
//!
//! 1. waits on the one-time partial barrier,
//! 2. selects the layout from the context's `layout` key or the configured
//!    default,
//! 3. renders the view through the cache,
//! 4. binds the output as `body` and renders the layout through the cache
//!    (and, with `chain_layouts`, each parent layout in turn).
//!
//! Placeholders contributed by the view are drained by the layout. Every
//! render gets its own placeholder registry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stache_core::logging::render_span;
use stache_core::{EngineConfig, Settings, StacheError, StacheResult};
use tokio::sync::{Mutex, OnceCell};
use tracing::Instrument;

use crate::cache::TemplateCache;
use crate::context::{Context, ContextValue};
use crate::helpers::{HelperCall, HelperFn, HelperRegistry};
use crate::layout::{self, LayoutSelection, BODY_KEY};
use crate::parser::{self, CompiledTemplate};
use crate::partials::{self, PartialRegistry};
use crate::placeholders::Placeholders;
use crate::render::Renderer;
use crate::source::{FileSystemSource, TemplatePath, TemplateSource};

/// The template engine.
///
/// Cheap to share as `Arc<Engine>`; every method takes `&self`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use stache_core::EngineConfig;
/// use stache_template::context::Context;
/// use stache_template::engine::Engine;
/// use stache_template::source::MemorySource;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let source = Arc::new(MemorySource::new());
/// source.insert("/views/home.hbs", "Hello {{name}}!");
/// source.insert("/views/layouts/main.hbs", "<main>{{{body}}}</main>");
///
/// let mut config = EngineConfig::new("/views");
/// config.partials_folder.clear();
/// let engine = Engine::with_source(config, source).unwrap();
///
/// let mut ctx = Context::from_json(serde_json::json!({"name": "Ann"}));
/// let html = engine.render("home", &mut ctx).await.unwrap();
/// assert_eq!(html, "<main>Hello Ann!</main>");
/// # });
/// ```
pub struct Engine {
    config: EngineConfig,
    view_path: PathBuf,
    cache: TemplateCache,
    partials: PartialRegistry,
    helpers: HelperRegistry,
    partials_ready: OnceCell<()>,
    partial_attempts: AtomicU64,
    partial_failure: Mutex<Option<StacheError>>,
}

impl Engine {
    /// Creates an engine that reads templates from the filesystem.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `view_path` is missing or the configuration
    /// is otherwise invalid.
    pub fn new(config: EngineConfig) -> StacheResult<Self> {
        Self::with_source(config, Arc::new(FileSystemSource::new()))
    }

    /// Creates an engine from loaded [`Settings`].
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn from_settings(settings: &Settings) -> StacheResult<Self> {
        Self::new(settings.engine.clone())
    }

    /// Creates an engine that reads templates through `source`.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn with_source(config: EngineConfig, source: Arc<dyn TemplateSource>) -> StacheResult<Self> {
        config.validate()?;
        let view_path = TemplatePath::new(config.require_view_path()?)
            .as_path()
            .to_path_buf();

        tracing::debug!(
            view_path = %view_path.display(),
            cache = config.cache_templates,
            chain_layouts = config.chain_layouts,
            "template engine created"
        );

        Ok(Self {
            cache: TemplateCache::new(source, config.cache_templates),
            view_path,
            config,
            partials: PartialRegistry::new(),
            helpers: HelperRegistry::with_builtins(),
            partials_ready: OnceCell::new(),
            partial_attempts: AtomicU64::new(0),
            partial_failure: Mutex::new(None),
        })
    }

    /// The engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The compiled-template cache.
    pub const fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// The registered partials.
    pub const fn partials(&self) -> &PartialRegistry {
        &self.partials
    }

    /// Registers a helper callable from templates.
    pub fn register_helper<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(&mut HelperCall<'_, '_>) -> StacheResult<ContextValue> + Send + Sync + 'static,
    {
        self.helpers.register(name, helper);
    }

    /// Registers several helpers at once.
    pub fn register_helpers<I, S>(&self, helpers: I)
    where
        I: IntoIterator<Item = (S, HelperFn)>,
        S: Into<String>,
    {
        for (name, helper) in helpers {
            self.helpers.register_arc(name, helper);
        }
    }

    /// Compiles `source` and registers it as the partial `name`.
    ///
    /// # Errors
    ///
    /// Returns `CompileError` for invalid syntax and `PartialLoadError` if
    /// the name is taken.
    pub fn register_partial(&self, name: &str, source: &str) -> StacheResult<()> {
        let template = parser::compile(name, source)?;
        self.partials.register(name, name, Arc::new(template))
    }

    /// Loads partials from additional folders under the view path.
    ///
    /// # Errors
    ///
    /// Returns `PartialLoadError` if a folder is missing, a file fails to
    /// compile, or a name collides. Nothing is registered on error.
    pub async fn load_partials<S: AsRef<str>>(&self, folders: &[S]) -> StacheResult<usize> {
        partials::load_partials(
            &self.cache,
            &self.partials,
            &self.view_path,
            folders,
            &self.config.file_extension,
        )
        .await
    }

    /// Loads the configured partial folders now instead of on the first
    /// render.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::load_partials`].
    pub async fn preload(&self) -> StacheResult<()> {
        self.ensure_partials().await
    }

    /// Waits until the configured partials are loaded.
    ///
    /// One load runs at a time. Callers that queued behind a failed attempt
    /// get that attempt's error instead of loading again; the next caller to
    /// arrive afterwards starts a fresh attempt.
    async fn ensure_partials(&self) -> StacheResult<()> {
        if self.partials_ready.initialized() {
            return Ok(());
        }
        let seen = self.partial_attempts.load(Ordering::Acquire);
        let mut failure = self.partial_failure.lock().await;
        if self.partials_ready.initialized() {
            return Ok(());
        }
        if self.partial_attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = failure.as_ref() {
                return Err(err.duplicate());
            }
        }

        let outcome = self
            .load_partials(self.config.partials_folder.as_slice())
            .await;
        self.partial_attempts.fetch_add(1, Ordering::AcqRel);
        match outcome {
            Ok(count) => {
                tracing::info!(
                    count,
                    folders = ?self.config.partials_folder,
                    "partials loaded"
                );
                *failure = None;
                let _ = self.partials_ready.set(());
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "partial loading failed");
                *failure = Some(e.duplicate());
                Err(e)
            }
        }
    }

    /// Resolves a view name to `<view_path>/<name>.<ext>`.
    pub fn view_path(&self, view: &str) -> TemplatePath {
        if Path::new(view).is_absolute() {
            layout::template_path(Path::new("/"), view, &self.config)
        } else {
            layout::template_path(&self.view_path, view, &self.config)
        }
    }

    /// Resolves a layout name to `<view_path>/<layouts_folder>/<name>.<ext>`.
    pub fn layout_path(&self, name: &str) -> TemplatePath {
        layout::layout_path(&self.view_path, name, &self.config)
    }

    /// Renders the view `view` with `context`, wrapped in the selected
    /// layout.
    ///
    /// # Errors
    ///
    /// Returns the first failure: `PartialLoadError` from the partial
    /// barrier, `ReadError`/`CompileError` from the cache, or `RenderError`
    /// from evaluation. Errors name the template they came from.
    pub async fn render(&self, view: &str, context: &mut Context) -> StacheResult<String> {
        let path = self.view_path(view);
        self.render_template(&path, context).await
    }

    /// Renders the template file at `path` through the same pipeline as
    /// [`Engine::render`].
    ///
    /// # Errors
    ///
    /// Same as [`Engine::render`].
    pub async fn render_template(
        &self,
        path: &TemplatePath,
        context: &mut Context,
    ) -> StacheResult<String> {
        let span = render_span(&path.to_string());
        self.render_pipeline(path, context)
            .instrument(span)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "render failed"))
    }

    /// Compiles and renders `source` directly: no cache, no layout, and only
    /// the partials registered so far.
    ///
    /// # Errors
    ///
    /// Returns `CompileError` or `RenderError`.
    pub fn render_string(&self, source: &str, context: &mut Context) -> StacheResult<String> {
        let template = parser::compile("<string>", source)?;
        let partials = self.partials.snapshot();
        let helpers = self.helpers.snapshot();
        let mut placeholders = Placeholders::new();
        Renderer::new(&partials, &helpers, &mut placeholders).render(&template, context)
    }

    async fn render_pipeline(&self, path: &TemplatePath, context: &mut Context) -> StacheResult<String> {
        self.ensure_partials().await?;

        let layout_name = LayoutSelection::from_context(context).resolve(&self.config);
        let view = self.cache.get_or_compile(path).await?;

        let partials = self.partials.snapshot();
        let helpers = self.helpers.snapshot();
        let mut placeholders = Placeholders::new();

        let body = Renderer::new(&partials, &helpers, &mut placeholders).render(&view, context)?;
        let Some(layout_name) = layout_name else {
            return Ok(body);
        };

        let mut body = body;
        let mut visited: Vec<TemplatePath> = Vec::new();
        let mut next = Some(layout_name);

        while let Some(name) = next {
            let layout_path = self.layout_path(&name);
            if visited.contains(&layout_path) {
                return Err(layout_cycle(&visited, &layout_path));
            }

            let layout = self.cache.get_or_compile(&layout_path).await?;
            tracing::debug!(layout = %layout_path, "applying layout");
            context.set_root(BODY_KEY, ContextValue::SafeString(body));
            body = Renderer::new(&partials, &helpers, &mut placeholders).render(&layout, context)?;

            next = self.parent_of(&layout);
            visited.push(layout_path);
        }

        Ok(body)
    }

    fn parent_of(&self, layout: &CompiledTemplate) -> Option<String> {
        if self.config.chain_layouts {
            layout.parent_layout().map(ToString::to_string)
        } else {
            None
        }
    }
}

fn layout_cycle(visited: &[TemplatePath], repeated: &TemplatePath) -> StacheError {
    let chain: Vec<String> = visited
        .iter()
        .chain(std::iter::once(repeated))
        .map(ToString::to_string)
        .collect();
    StacheError::RenderError {
        path: repeated.to_string(),
        message: format!("layout cycle: {}", chain.join(" -> ")),
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("view_path", &self.view_path)
            .field("cache", &self.cache)
            .field("partials", &self.partials.names())
            .field("helpers", &self.helpers)
            .finish_non_exhaustive()
    }
}
