//! Named content regions filled during one render.
//!
//! A view (or any template rendered before the layout) contributes content
//! to a named block with `{{#contentFor "name"}}...{{/contentFor}}`. The
//! layout reads it back with `{{{block "name"}}}` or
//! `{{#block "name"}}default{{/block}}`. Reading drains the block, so a
//! second read sees nothing until something is contributed again.
//!
//! A [`Placeholders`] value lives for exactly one render invocation; two
//! concurrent renders never share one.

use std::collections::HashMap;

use stache_core::StacheResult;

/// Separator placed between contributions to the same block.
pub const SEPARATOR: &str = "\n";

/// Per-render registry of block contributions.
///
/// # Examples
///
/// ```
/// use stache_template::placeholders::Placeholders;
///
/// let mut blocks = Placeholders::new();
/// blocks.contribute("scripts", || Ok("<script src=a.js></script>".into())).unwrap();
/// blocks.contribute("scripts", || Ok("<script src=b.js></script>".into())).unwrap();
///
/// let out = blocks.define("scripts", None::<fn() -> _>).unwrap();
/// assert_eq!(out, "<script src=a.js></script>\n<script src=b.js></script>");
/// assert_eq!(blocks.define("scripts", None::<fn() -> _>).unwrap(), "");
/// ```
#[derive(Debug, Default, Clone)]
pub struct Placeholders {
    blocks: HashMap<String, Vec<String>>,
}

impl Placeholders {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and clears the content accumulated for `name`.
    ///
    /// When nothing was contributed, `default` (if any) is run and its output
    /// returned without being stored. An unknown block yields `""`.
    pub fn define<F>(&mut self, name: &str, default: Option<F>) -> StacheResult<String>
    where
        F: FnOnce() -> StacheResult<String>,
    {
        match self.take(name) {
            Some(content) => Ok(content),
            None => default.map_or_else(|| Ok(String::new()), |produce| produce()),
        }
    }

    /// Runs `producer` and appends its output to the block `name`.
    pub fn contribute<F>(&mut self, name: &str, producer: F) -> StacheResult<()>
    where
        F: FnOnce() -> StacheResult<String>,
    {
        let content = producer()?;
        self.append(name, content);
        Ok(())
    }

    /// Appends already rendered content to the block `name`.
    pub(crate) fn append(&mut self, name: &str, content: String) {
        self.blocks.entry(name.to_string()).or_default().push(content);
    }

    /// Removes the block `name`, returning its joined content if anything
    /// was contributed.
    pub(crate) fn take(&mut self, name: &str) -> Option<String> {
        self.blocks
            .remove(name)
            .filter(|parts| !parts.is_empty())
            .map(|parts| parts.join(SEPARATOR))
    }

    /// Returns `true` if content is waiting in the block `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.blocks.get(name).is_some_and(|parts| !parts.is_empty())
    }

    /// Returns `true` if no block holds content.
    pub fn is_empty(&self) -> bool {
        self.blocks.values().all(Vec::is_empty)
    }
}
