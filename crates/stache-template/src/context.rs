//! Template context for variable resolution and rendering.
//!
//! Provides [`Context`] for holding template variables in a stack of scopes,
//! and [`ContextValue`] for representing dynamic template values.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use stache_core::StacheError;

use crate::parser::PathExpr;

/// Represents a dynamic value in a template context.
///
/// Containers come in three closed shapes: an ordered sequence ([`List`]),
/// a key-ordered mapping ([`Dict`]) and a set of unique elements ([`Set`]).
/// Iteration helpers dispatch on the shape once through
/// [`ContextValue::iteration`].
///
/// [`List`]: ContextValue::List
/// [`Dict`]: ContextValue::Dict
/// [`Set`]: ContextValue::Set
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// A string value, HTML-escaped on output.
    String(String),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// An ordered list of values.
    List(Vec<ContextValue>),
    /// A key-ordered mapping.
    Dict(BTreeMap<String, ContextValue>),
    /// A set of unique strings, iterated in sorted order.
    Set(BTreeSet<String>),
    /// The absence of a value.
    None,
    /// A string marked as safe: auto-escaping will not be applied.
    SafeString(String),
}

/// One step of an iteration over a container value.
#[derive(Debug, Clone)]
pub struct IterRecord {
    /// The mapping key, or the position for sequences and sets.
    pub key: ContextValue,
    /// The element itself.
    pub value: ContextValue,
    /// Zero-based position.
    pub index: usize,
    /// Whether this is the first element.
    pub first: bool,
    /// Whether this is the last element.
    pub last: bool,
}

impl ContextValue {
    /// Returns `true` if this value is "truthy" in template logic.
    ///
    /// `None`, `false`, `0`, `0.0`, empty strings and empty containers are
    /// falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) | Self::SafeString(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            Self::Set(s) => !s.is_empty(),
        }
    }

    /// Converts this value to a display string (without HTML escaping).
    pub fn to_display_string(&self) -> String {
        match self {
            Self::String(s) | Self::SafeString(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => items
                .iter()
                .map(Self::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Set(items) => items.iter().cloned().collect::<Vec<_>>().join(","),
            Self::Dict(_) => "[object Object]".to_string(),
            Self::None => String::new(),
        }
    }

    /// Returns `true` if this value is a safe string (auto-escaping bypassed).
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::SafeString(_))
    }

    /// Marks a string value as safe, bypassing auto-escaping.
    #[must_use]
    pub fn mark_safe(self) -> Self {
        match self {
            Self::String(s) => Self::SafeString(s),
            other => other,
        }
    }

    /// Resolves one path segment on this value (e.g. `name` on a mapping,
    /// `0` or `length` on a sequence).
    pub fn resolve_path(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Dict(map) => map.get(key),
            Self::List(list) => key.parse::<usize>().ok().and_then(|idx| list.get(idx)),
            _ => None,
        }
    }

    /// Returns the length of a string or container.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) | Self::SafeString(s) => Some(s.chars().count()),
            Self::List(l) => Some(l.len()),
            Self::Dict(d) => Some(d.len()),
            Self::Set(s) => Some(s.len()),
            _ => None,
        }
    }

    /// Returns `true` if this is an empty collection or empty string.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|l| l == 0)
    }

    /// Returns the string contents if this is a String or SafeString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::SafeString(s) => Some(s),
            _ => None,
        }
    }

    /// Produces the iteration records for a container value.
    ///
    /// Sequences and sets are keyed by position; mappings by key in key
    /// order. Scalars yield no records.
    pub fn iteration(&self) -> Vec<IterRecord> {
        let entries: Vec<(ContextValue, ContextValue)> = match self {
            Self::List(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| (Self::from(idx), item.clone()))
                .collect(),
            Self::Dict(map) => map
                .iter()
                .map(|(k, v)| (Self::String(k.clone()), v.clone()))
                .collect(),
            Self::Set(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| (Self::from(idx), Self::String(item.clone())))
                .collect(),
            _ => Vec::new(),
        };

        let total = entries.len();
        entries
            .into_iter()
            .enumerate()
            .map(|(index, (key, value))| IterRecord {
                key,
                value,
                index,
                first: index == 0,
                last: index + 1 == total,
            })
            .collect()
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for ContextValue {
    #[allow(clippy::cast_precision_loss)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a) | Self::SafeString(a), Self::String(b) | Self::SafeString(b)) => {
                a == b
            }
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::None, Self::None) => true,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a == b,
            _ => false,
        }
    }
}

// -- From implementations --

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for ContextValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<usize> for ContextValue {
    #[allow(clippy::cast_possible_wrap)]
    fn from(i: usize) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<f64> for ContextValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<ContextValue>> From<Vec<T>> for ContextValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ContextValue>> From<BTreeMap<String, T>> for ContextValue {
    fn from(m: BTreeMap<String, T>) -> Self {
        Self::Dict(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<ContextValue>> From<HashMap<String, T>> for ContextValue {
    fn from(m: HashMap<String, T>) -> Self {
        Self::Dict(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<BTreeSet<String>> for ContextValue {
    fn from(s: BTreeSet<String>) -> Self {
        Self::Set(s)
    }
}

impl<T: Into<ContextValue>> From<Option<T>> for ContextValue {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::None, Into::into)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::None),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::List(arr.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// A template context that holds variables in a stack of scopes.
///
/// Block helpers such as `each` and `with` push a scope whose `this` entry
/// is the new context object; lookups search from the top of the stack
/// downward. `../name` skips scopes, `@root.name` reads the bottom scope.
///
/// # Examples
///
/// ```
/// use stache_template::context::{Context, ContextValue};
///
/// let mut ctx = Context::new();
/// ctx.set("name", ContextValue::from("Ann"));
/// assert_eq!(ctx.get("name").unwrap().to_display_string(), "Ann");
///
/// ctx.push();
/// ctx.set("name", ContextValue::from("Bea"));
/// assert_eq!(ctx.get("name").unwrap().to_display_string(), "Bea");
///
/// ctx.pop();
/// assert_eq!(ctx.get("name").unwrap().to_display_string(), "Ann");
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    stack: Vec<HashMap<String, ContextValue>>,
}

/// The scope key holding the current context object.
pub(crate) const THIS: &str = "this";

impl Context {
    /// Creates a new empty context with a single scope.
    pub fn new() -> Self {
        Self {
            stack: vec![HashMap::new()],
        }
    }

    /// Creates a context whose root scope holds the entries of a JSON object.
    ///
    /// Non-object values are bound to `this`.
    pub fn from_json(value: serde_json::Value) -> Self {
        let mut ctx = Self::new();
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    ctx.set(k, ContextValue::from(v));
                }
            }
            other => ctx.set(THIS, ContextValue::from(other)),
        }
        ctx
    }

    /// Creates a context from any serializable value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StacheError> {
        serde_json::to_value(value)
            .map(Self::from_json)
            .map_err(|e| StacheError::render(format!("Context is not serializable: {e}")))
    }

    /// Pushes a new scope onto the context stack.
    pub fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    /// Pushes a scope that makes `value` the current context object.
    ///
    /// Mapping entries become directly visible by name.
    pub fn push_this(&mut self, value: ContextValue) {
        let mut scope = HashMap::new();
        if let ContextValue::Dict(map) = &value {
            for (k, v) in map {
                scope.insert(k.clone(), v.clone());
            }
        }
        scope.insert(THIS.to_string(), value);
        self.stack.push(scope);
    }

    /// Pops the top scope from the context stack.
    ///
    /// If only one scope remains, this is a no-op.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Returns the number of scopes on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Sets a variable in the current (top) scope.
    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(key.into(), value);
        }
    }

    /// Sets a variable in the root scope, visible to every nested scope.
    pub fn set_root(&mut self, key: impl Into<String>, value: ContextValue) {
        if let Some(root) = self.stack.first_mut() {
            root.insert(key.into(), value);
        }
    }

    /// Removes a variable from the root scope.
    pub fn remove_root(&mut self, key: &str) -> Option<ContextValue> {
        self.stack.first_mut().and_then(|root| root.remove(key))
    }

    /// Looks up a variable by name, searching from the top scope downward.
    ///
    /// Supports dot-separated paths like `user.name` or `items.0`.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        let mut parts = key.split('.');
        let root_key = parts.next()?;
        let value = Self::lookup_in(&self.stack, root_key)?;
        parts.try_fold(value, |current, part| current.resolve_path(part))
    }

    /// Resolves a parsed path expression.
    pub(crate) fn resolve(&self, path: &PathExpr) -> Option<ContextValue> {
        let visible = self.stack.len().saturating_sub(path.parents).max(1);
        let frames = &self.stack[..visible];

        if path.explicit_this {
            return Self::walk(Self::this_in(frames, self), &path.segments);
        }

        let (first, rest) = match path.segments.split_first() {
            Some((root, rest)) if path.data && root == "root" => {
                return Self::walk(self.root_object(), rest);
            }
            Some((name, rest)) if path.data => (format!("@{name}"), rest),
            Some((first, rest)) => (first.clone(), rest),
            None => return None,
        };

        let value = Self::lookup_in(frames, &first)?.clone();
        Self::walk(value, rest)
    }

    fn walk(base: ContextValue, rest: &[String]) -> Option<ContextValue> {
        let mut current = base;
        for part in rest {
            if part == "length" {
                if let Some(len) = current.len() {
                    current = ContextValue::from(len);
                    continue;
                }
            }
            current = current.resolve_path(part)?.clone();
        }
        Some(current)
    }

    /// Finds `key` in the innermost scope that defines it. Bare names inside
    /// `each`/`with` fall back to enclosing scopes, so a layout or partial
    /// can read page-level values from inside a loop.
    fn lookup_in<'a>(
        frames: &'a [HashMap<String, ContextValue>],
        key: &str,
    ) -> Option<&'a ContextValue> {
        frames.iter().rev().find_map(|scope| scope.get(key))
    }

    /// The nearest context object, or the root scope viewed as a mapping.
    fn this_in(frames: &[HashMap<String, ContextValue>], ctx: &Self) -> ContextValue {
        frames
            .iter()
            .rev()
            .find_map(|scope| scope.get(THIS).cloned())
            .unwrap_or_else(|| ctx.root_object())
    }

    fn root_object(&self) -> ContextValue {
        self.stack
            .first()
            .map(|root| {
                ContextValue::Dict(
                    root.iter()
                        .filter(|(k, _)| !k.starts_with('@'))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                )
            })
            .unwrap_or(ContextValue::None)
    }

    /// Flattens all scopes into a single map, with later scopes overriding earlier ones.
    pub fn flatten(&self) -> HashMap<String, ContextValue> {
        let mut result = HashMap::new();
        for scope in &self.stack {
            for (k, v) in scope {
                result.insert(k.clone(), v.clone());
            }
        }
        result
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Escapes HTML special characters in a string.
///
/// Replaces `&`, `<`, `>`, `"`, `'`, `` ` `` and `=` with their HTML entity
/// equivalents.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(ch),
        }
    }
    out
}
