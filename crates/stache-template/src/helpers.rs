//! Helper registry and the built-in helpers.
//!
//! A helper is a named function called from a template, either inline
//! (`{{name arg key=value}}`) or as a block (`{{#name arg}}...{{/name}}`).
//! It receives a [`HelperCall`] and returns the value to output.
//!
//! Built-ins:
//!
//! | Helper       | Use                                                  |
//! |--------------|------------------------------------------------------|
//! | `if`         | `{{#if cond}}..{{else}}..{{/if}}`                    |
//! | `unless`     | `{{#unless cond}}..{{/unless}}`                      |
//! | `each`       | `{{#each items}}{{@index}} {{this}}{{/each}}`        |
//! | `with`       | `{{#with user}}{{name}}{{/with}}`                    |
//! | `lookup`     | `{{lookup map key}}`                                 |
//! | `log`        | `{{log "message" value}}`                            |
//! | `block`      | `{{{block "scripts"}}}`, `{{#block "title"}}x{{/block}}` |
//! | `contentFor` | `{{#contentFor "scripts"}}...{{/contentFor}}`        |

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use stache_core::{StacheError, StacheResult};

use crate::context::ContextValue;
pub use crate::render::HelperCall;

/// A registered helper.
pub type HelperFn =
    Arc<dyn Fn(&mut HelperCall<'_, '_>) -> StacheResult<ContextValue> + Send + Sync>;

/// Helpers keyed by name.
pub type HelperMap = HashMap<String, HelperFn>;

/// Registered helpers, published copy-on-write so a render works from a
/// stable snapshot.
pub struct HelperRegistry {
    helpers: RwLock<Arc<HelperMap>>,
}

impl HelperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            helpers: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Creates a registry holding the built-in helpers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("if", if_helper);
        registry.register("unless", unless_helper);
        registry.register("each", each_helper);
        registry.register("with", with_helper);
        registry.register("lookup", lookup_helper);
        registry.register("log", log_helper);
        registry.register("block", block_helper);
        registry.register("contentFor", content_for_helper);
        registry
    }

    /// Registers `helper` under `name`, replacing any helper of that name.
    pub fn register<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(&mut HelperCall<'_, '_>) -> StacheResult<ContextValue> + Send + Sync + 'static,
    {
        self.register_arc(name, Arc::new(helper));
    }

    /// Registers an already shared helper.
    pub fn register_arc(&self, name: impl Into<String>, helper: HelperFn) {
        let mut guard = self.helpers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: HelperMap = (**guard).clone();
        next.insert(name.into(), helper);
        *guard = Arc::new(next);
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// Returns the current set of helpers.
    pub fn snapshot(&self) -> Arc<HelperMap> {
        Arc::clone(&self.helpers.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        f.debug_struct("HelperRegistry").field("helpers", &names).finish()
    }
}

/// Returns the single positional argument, or an error naming the helper.
fn single_param(call: &HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    match call.params() {
        [value] => Ok(value.clone()),
        _ => Err(StacheError::render(format!(
            "#{} requires exactly one argument",
            call.name()
        ))),
    }
}

fn block_name(call: &HelperCall<'_, '_>) -> StacheResult<String> {
    match call.param(0) {
        Some(name) if !name.to_display_string().is_empty() => Ok(name.to_display_string()),
        _ => Err(StacheError::render(format!(
            "{} requires a block name",
            call.name()
        ))),
    }
}

fn conditional(call: &mut HelperCall<'_, '_>, negate: bool) -> StacheResult<ContextValue> {
    let value = single_param(call)?;
    let include_zero = call.hash("includeZero").is_some_and(ContextValue::is_truthy);
    let truthy = value.is_truthy()
        || (include_zero && matches!(value, ContextValue::Integer(0) | ContextValue::Float(_)));
    let out = if truthy != negate {
        call.render_block()?
    } else {
        call.render_inverse()?
    };
    Ok(ContextValue::SafeString(out))
}

fn if_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    conditional(call, false)
}

fn unless_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    conditional(call, true)
}

fn each_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let value = single_param(call)?;
    let records = value.iteration();
    if records.is_empty() {
        return call.render_inverse().map(ContextValue::SafeString);
    }

    let mut out = String::new();
    for record in records {
        out.push_str(&call.render_iteration(record)?);
    }
    Ok(ContextValue::SafeString(out))
}

fn with_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let value = single_param(call)?;
    let out = if value.is_truthy() {
        call.render_block_with(value)?
    } else {
        call.render_inverse()?
    };
    Ok(ContextValue::SafeString(out))
}

fn lookup_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let (Some(target), Some(key)) = (call.param(0), call.param(1)) else {
        return Err(StacheError::render("lookup requires two arguments"));
    };
    Ok(target
        .resolve_path(&key.to_display_string())
        .cloned()
        .unwrap_or(ContextValue::None))
}

fn log_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let message = call
        .params()
        .iter()
        .map(ContextValue::to_display_string)
        .collect::<Vec<_>>()
        .join(" ");
    match call.hash("level").map(ContextValue::to_display_string).as_deref() {
        Some("debug") => tracing::debug!(target: "stache_template::log", "{message}"),
        Some("warn") => tracing::warn!(target: "stache_template::log", "{message}"),
        Some("error") => tracing::error!(target: "stache_template::log", "{message}"),
        _ => tracing::info!(target: "stache_template::log", "{message}"),
    }
    Ok(ContextValue::None)
}

type NoDefault = fn() -> StacheResult<String>;

/// Reads a placeholder block. Falls back to the block body, which is
/// rendered but never stored.
fn block_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let name = block_name(call)?;
    let content = if call.is_block() && !call.placeholders().contains(&name) {
        let fallback = call.render_block()?;
        call.placeholders().define(&name, Some(|| Ok(fallback)))?
    } else {
        call.placeholders().define(&name, None::<NoDefault>)?
    };
    Ok(ContextValue::SafeString(content))
}

/// Appends the rendered body to a placeholder block.
fn content_for_helper(call: &mut HelperCall<'_, '_>) -> StacheResult<ContextValue> {
    let name = block_name(call)?;
    if !call.is_block() {
        return Err(StacheError::render(format!(
            "contentFor '{name}' must be used as a block"
        )));
    }
    let content = call.render_block()?;
    call.placeholders().contribute(&name, || Ok(content))?;
    Ok(ContextValue::None)
}
