//! Partial loading and lookup.
//!
//! Partials live in one or more folders under the view path. Each file with
//! the template extension is compiled and registered under its path relative
//! to the folder, extension stripped and separators normalized to `/`:
//! `partials/forms/input.hbs` becomes `forms/input`.
//!
//! Two files that derive the same name, or a name that is already
//! registered, are a configuration error. A load publishes its whole set at
//! once or nothing at all.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use stache_core::{StacheError, StacheResult};

use crate::cache::TemplateCache;
use crate::parser::CompiledTemplate;
use crate::source::TemplatePath;

/// The registered partials, keyed by name.
pub type PartialMap = HashMap<String, Arc<CompiledTemplate>>;

/// Derives the partial name of `file` inside `folder`.
///
/// Returns `None` if `file` is not under `folder` or lacks the extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stache_template::partials::partial_name;
///
/// let name = partial_name(
///     Path::new("/views/partials"),
///     Path::new("/views/partials/forms/input.hbs"),
///     "hbs",
/// );
/// assert_eq!(name.as_deref(), Some("forms/input"));
/// ```
pub fn partial_name(folder: &Path, file: &Path, extension: &str) -> Option<String> {
    let relative = file.strip_prefix(folder).ok()?;
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect();
    let joined = segments.join("/");
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    joined
        .strip_suffix(&suffix)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
}

/// Registered partials, published copy-on-write.
///
/// Readers take a snapshot (`Arc<PartialMap>`) for the length of one render,
/// so a concurrent load never shows them a half-filled set.
#[derive(Debug, Default)]
pub struct PartialRegistry {
    partials: RwLock<Arc<PartialMap>>,
    origins: RwLock<HashMap<String, PathBuf>>,
}

impl PartialRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current set of partials.
    pub fn snapshot(&self) -> Arc<PartialMap> {
        Arc::clone(&self.partials.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Looks up a single partial.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.snapshot().get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// Number of registered partials.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if no partial is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registers one partial.
    ///
    /// # Errors
    ///
    /// Returns `PartialLoadError` if the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        origin: impl Into<PathBuf>,
        template: Arc<CompiledTemplate>,
    ) -> StacheResult<()> {
        let mut staged = HashMap::new();
        staged.insert(name.into(), (origin.into(), template));
        self.publish(staged)
    }

    /// Adds every staged partial, or none if any name is already taken.
    fn publish(&self, staged: HashMap<String, (PathBuf, Arc<CompiledTemplate>)>) -> StacheResult<()> {
        let mut partials = self.partials.write().unwrap_or_else(PoisonError::into_inner);
        let mut origins = self.origins.write().unwrap_or_else(PoisonError::into_inner);

        for (name, (origin, _)) in &staged {
            if let Some(existing) = origins.get(name) {
                return Err(collision(name, existing, origin));
            }
        }

        let mut next: PartialMap = (**partials).clone();
        for (name, (origin, template)) in staged {
            origins.insert(name.clone(), origin);
            next.insert(name, template);
        }
        *partials = Arc::new(next);
        Ok(())
    }
}

fn collision(name: &str, first: &Path, second: &Path) -> StacheError {
    StacheError::PartialLoadError {
        path: second.to_path_buf(),
        message: format!(
            "partial name '{name}' is already registered by '{}'",
            first.display()
        ),
    }
}

/// Scans `folders` under `base`, compiles every template file and registers
/// it in `registry`.
///
/// Files are compiled through [`TemplateCache::compile_and_insert`], so a
/// later direct render of a partial file hits the cache. Returns the number
/// of partials registered.
///
/// # Errors
///
/// Returns `PartialLoadError` if a folder is missing or unreadable, a file
/// fails to read or compile, or two partials derive the same name. Nothing
/// is registered on error.
pub async fn load_partials<S: AsRef<str>>(
    cache: &TemplateCache,
    registry: &PartialRegistry,
    base: &Path,
    folders: &[S],
    extension: &str,
) -> StacheResult<usize> {
    let mut staged: HashMap<String, (PathBuf, Arc<CompiledTemplate>)> = HashMap::new();

    for folder in folders {
        let dir = base.join(folder.as_ref());
        let files = cache.source().list(&dir, extension).await?;
        tracing::debug!(folder = %dir.display(), files = files.len(), "scanning partials");

        for file in files {
            let Some(name) = partial_name(&dir, &file, extension) else {
                continue;
            };
            if let Some((existing, _)) = staged.get(&name) {
                return Err(collision(&name, existing, &file));
            }
            let template = cache
                .compile_and_insert(&TemplatePath::new(&file))
                .await
                .map_err(|e| StacheError::PartialLoadError {
                    path: file.clone(),
                    message: e.to_string(),
                })?;
            staged.insert(name, (file, template));
        }
    }

    let count = staged.len();
    registry.publish(staged)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::source::MemorySource;

    fn setup(files: &[(&str, &str)]) -> (Arc<MemorySource>, TemplateCache, PartialRegistry) {
        let source = Arc::new(MemorySource::new());
        for (path, text) in files {
            source.insert(path, *text);
        }
        let cache = TemplateCache::new(source.clone(), true);
        (source, cache, PartialRegistry::new())
    }

    #[test]
    fn test_partial_name() {
        let folder = Path::new("/v/partials");
        assert_eq!(
            partial_name(folder, Path::new("/v/partials/card.hbs"), "hbs").as_deref(),
            Some("card")
        );
        assert_eq!(
            partial_name(folder, Path::new("/v/partials/a/b/c.hbs"), ".hbs").as_deref(),
            Some("a/b/c")
        );
        assert_eq!(partial_name(folder, Path::new("/v/other/card.hbs"), "hbs"), None);
        assert_eq!(partial_name(folder, Path::new("/v/partials/card.txt"), "hbs"), None);
    }

    #[tokio::test]
    async fn test_load_partials_registers_and_caches() {
        let (_, cache, registry) = setup(&[
            ("/v/partials/card.hbs", "<b>{{name}}</b>"),
            ("/v/partials/forms/input.hbs", "<input>"),
        ]);

        let count = load_partials(&cache, &registry, Path::new("/v"), &["partials"], "hbs")
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.names(), vec!["card", "forms/input"]);
        assert!(cache.contains(&TemplatePath::new("/v/partials/card.hbs")));
    }

    #[tokio::test]
    async fn test_load_partials_multiple_folders() {
        let (_, cache, registry) = setup(&[
            ("/v/partials/card.hbs", "card"),
            ("/v/shared/footer.hbs", "footer"),
        ]);
        load_partials(&cache, &registry, Path::new("/v"), &["partials", "shared"], "hbs")
            .await
            .unwrap();
        assert!(registry.contains("card"));
        assert!(registry.contains("footer"));
    }

    #[tokio::test]
    async fn test_collision_is_error_and_nothing_registered() {
        let (_, cache, registry) = setup(&[
            ("/v/partials/a.hbs", "a"),
            ("/v/partials/card.hbs", "one"),
            ("/v/shared/card.hbs", "two"),
        ]);
        let err = load_partials(&cache, &registry, Path::new("/v"), &["partials", "shared"], "hbs")
            .await
            .unwrap_err();
        assert!(matches!(err, StacheError::PartialLoadError { .. }));
        assert!(err.to_string().contains("card"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_collision_with_registered_partial() {
        let (_, cache, registry) = setup(&[("/v/partials/card.hbs", "file")]);
        let inline = Arc::new(parser::compile("card", "inline").unwrap());
        registry.register("card", "card", inline).unwrap();

        let err = load_partials(&cache, &registry, Path::new("/v"), &["partials"], "hbs")
            .await
            .unwrap_err();
        assert!(matches!(err, StacheError::PartialLoadError { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_folder_is_partial_load_error() {
        let (_, cache, registry) = setup(&[("/v/home.hbs", "home")]);
        let err = load_partials(&cache, &registry, Path::new("/v"), &["partials"], "hbs")
            .await
            .unwrap_err();
        assert!(matches!(err, StacheError::PartialLoadError { .. }));
    }

    #[tokio::test]
    async fn test_bad_partial_is_partial_load_error() {
        let (_, cache, registry) = setup(&[("/v/partials/bad.hbs", "{{#if x}}")]);
        let err = load_partials(&cache, &registry, Path::new("/v"), &["partials"], "hbs")
            .await
            .unwrap_err();
        match err {
            StacheError::PartialLoadError { path, .. } => {
                assert_eq!(path, PathBuf::from("/v/partials/bad.hbs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_is_stable_across_publish() {
        let registry = PartialRegistry::new();
        let before = registry.snapshot();
        let template = Arc::new(parser::compile("x", "x").unwrap());
        registry.register("x", "x", template).unwrap();
        assert!(before.is_empty());
        assert_eq!(registry.snapshot().len(), 1);
    }
}
