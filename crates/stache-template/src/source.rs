//! Where template text comes from.
//!
//! The [`TemplateSource`] trait is the seam between the engine and storage.
//! [`FileSystemSource`] reads files with `tokio::fs`; [`MemorySource`] keeps
//! templates in memory and counts reads, which makes cache behaviour
//! observable in tests.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use stache_core::{StacheError, StacheResult};
use walkdir::WalkDir;

/// An absolute, lexically normalized template path. Used as the cache key.
///
/// `.` segments are dropped and `..` segments pop their parent, so
/// `/views/./layouts/../home.hbs` and `/views/home.hbs` are the same key.
/// Relative paths are made absolute against the current directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplatePath(PathBuf);

impl TemplatePath {
    /// Normalizes `path` into a template path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        Self(normalized)
    }

    /// Returns the path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for TemplatePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Reads template text and lists template files.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Reads the template at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` if the template is missing or unreadable.
    async fn read(&self, path: &TemplatePath) -> StacheResult<String>;

    /// Lists every file under `dir` (recursively) whose extension is
    /// `extension`, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns `PartialLoadError` if `dir` is missing or cannot be walked.
    async fn list(&self, dir: &Path, extension: &str) -> StacheResult<Vec<PathBuf>>;
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy() == extension.trim_start_matches('.'))
}

/// Reads templates from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemSource;

impl FileSystemSource {
    /// Creates a new filesystem source.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateSource for FileSystemSource {
    async fn read(&self, path: &TemplatePath) -> StacheResult<String> {
        tokio::fs::read_to_string(path.as_path())
            .await
            .map_err(|e| StacheError::read(path, e))
    }

    async fn list(&self, dir: &Path, extension: &str) -> StacheResult<Vec<PathBuf>> {
        let dir = dir.to_path_buf();
        let extension = extension.to_string();
        let walk_dir = dir.clone();

        tokio::task::spawn_blocking(move || walk(&walk_dir, &extension))
            .await
            .map_err(|e| StacheError::PartialLoadError {
                path: dir,
                message: format!("directory scan did not finish: {e}"),
            })?
    }
}

fn walk(dir: &Path, extension: &str) -> StacheResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(StacheError::PartialLoadError {
            path: dir.to_path_buf(),
            message: "folder does not exist or is not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().follow_links(true) {
        let entry = entry.map_err(|e| StacheError::PartialLoadError {
            path: e.path().unwrap_or(dir).to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Keeps templates in memory and counts reads.
///
/// # Examples
///
/// ```
/// use stache_template::source::{MemorySource, TemplatePath, TemplateSource};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let source = MemorySource::new();
/// source.insert("/views/home.hbs", "Hello");
/// let text = source.read(&TemplatePath::new("/views/home.hbs")).await.unwrap();
/// assert_eq!(text, "Hello");
/// assert_eq!(source.reads(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemorySource {
    files: Mutex<HashMap<TemplatePath, String>>,
    reads: AtomicUsize,
    latency: Option<Duration>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every read by `latency`, widening the window in which
    /// concurrent requests overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds or replaces a template.
    pub fn insert(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TemplatePath::new(path), content.into());
    }

    /// Removes a template.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TemplatePath::new(path));
    }

    /// Total number of reads served, successful or not.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn read(&self, path: &TemplatePath) -> StacheResult<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| {
                StacheError::read(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such template"),
                )
            })
    }

    async fn list(&self, dir: &Path, extension: &str) -> StacheResult<Vec<PathBuf>> {
        let dir = TemplatePath::new(dir);
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);

        let under_dir: Vec<&TemplatePath> = files
            .keys()
            .filter(|p| p.as_path().starts_with(dir.as_path()))
            .collect();
        if under_dir.is_empty() {
            return Err(StacheError::PartialLoadError {
                path: dir.as_path().to_path_buf(),
                message: "folder does not exist or is not a directory".to_string(),
            });
        }

        let mut matching: Vec<PathBuf> = under_dir
            .into_iter()
            .filter(|p| has_extension(p.as_path(), extension))
            .map(|p| p.as_path().to_path_buf())
            .collect();
        matching.sort();
        Ok(matching)
    }
}
