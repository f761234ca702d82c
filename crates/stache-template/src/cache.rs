//! Compiled-template cache.
//!
//! Maps a [`TemplatePath`] to its [`CompiledTemplate`]. Each path owns a
//! `tokio::sync::OnceCell`, so concurrent first requests for the same path
//! share one read and one compile: the first caller initializes the cell,
//! the others wait on it. A failed initialization leaves the cell empty and
//! the next request tries again.
//!
//! With caching disabled every lookup reads and compiles afresh and nothing
//! is stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use stache_core::StacheResult;
use tokio::sync::OnceCell;

use crate::parser::{self, CompiledTemplate};
use crate::source::{TemplatePath, TemplateSource};

type Slot = Arc<OnceCell<Arc<CompiledTemplate>>>;

/// Cache of compiled templates, owned by one engine.
pub struct TemplateCache {
    source: Arc<dyn TemplateSource>,
    enabled: bool,
    entries: Mutex<HashMap<TemplatePath, Slot>>,
}

impl TemplateCache {
    /// Creates a cache that reads through `source`.
    pub fn new(source: Arc<dyn TemplateSource>, enabled: bool) -> Self {
        Self {
            source,
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether compiled templates are kept.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The source templates are read from.
    pub fn source(&self) -> &Arc<dyn TemplateSource> {
        &self.source
    }

    /// Returns the compiled template for `path`, reading and compiling it on
    /// a miss.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` if the file cannot be read and `CompileError` if
    /// its syntax is invalid.
    pub async fn get_or_compile(&self, path: &TemplatePath) -> StacheResult<Arc<CompiledTemplate>> {
        if !self.enabled {
            return self.load(path).await;
        }

        let slot = self.slot(path);
        if let Some(template) = slot.get() {
            tracing::debug!(path = %path, "template cache hit");
            return Ok(Arc::clone(template));
        }

        let result = slot
            .get_or_try_init(|| async {
                tracing::debug!(path = %path, "template cache miss");
                self.load(path).await
            })
            .await
            .map(Arc::clone);
        if result.is_err() {
            self.evict_empty(path, &slot);
        }
        result
    }

    /// Reads and compiles `path` unconditionally and stores the result,
    /// replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Same as [`TemplateCache::get_or_compile`].
    pub async fn compile_and_insert(
        &self,
        path: &TemplatePath,
    ) -> StacheResult<Arc<CompiledTemplate>> {
        let template = self.load(path).await?;
        if self.enabled {
            self.lock()
                .insert(path.clone(), Arc::new(OnceCell::new_with(Some(Arc::clone(&template)))));
        }
        Ok(template)
    }

    /// Returns `true` if a compiled template is stored for `path`.
    pub fn contains(&self, path: &TemplatePath) -> bool {
        self.lock()
            .get(path)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of compiled templates stored.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored template.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn slot(&self, path: &TemplatePath) -> Slot {
        Arc::clone(self.lock().entry(path.clone()).or_default())
    }

    /// Drops the slot for `path` if it is still `slot` and holds nothing, so
    /// failed lookups do not leave entries behind.
    fn evict_empty(&self, path: &TemplatePath, slot: &Slot) {
        let mut entries = self.lock();
        if entries
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            entries.remove(path);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TemplatePath, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, path: &TemplatePath) -> StacheResult<Arc<CompiledTemplate>> {
        let text = self.source.read(path).await?;
        let template = parser::compile(&path.to_string(), &text)?;
        Ok(Arc::new(template))
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("enabled", &self.enabled)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
