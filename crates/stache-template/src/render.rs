//! Evaluates a compiled node tree against a context.
//!
//! A [`Renderer`] lives for one render invocation. It borrows a snapshot of
//! the registered partials and helpers and the invocation's
//! [`Placeholders`], so nothing it touches is shared with another request.

use std::collections::BTreeMap;

use stache_core::{StacheError, StacheResult};

use crate::context::{escape_html, Context, ContextValue, IterRecord};
use crate::helpers::{HelperFn, HelperMap};
use crate::parser::{Call, CompiledTemplate, Expression, Node};
use crate::partials::PartialMap;
use crate::placeholders::Placeholders;

/// How deeply partials may nest before rendering gives up.
pub const MAX_PARTIAL_DEPTH: usize = 64;

/// Renders templates for one invocation.
pub struct Renderer<'a> {
    partials: &'a PartialMap,
    helpers: &'a HelperMap,
    placeholders: &'a mut Placeholders,
    depth: usize,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer over the given partials, helpers and placeholders.
    pub fn new(
        partials: &'a PartialMap,
        helpers: &'a HelperMap,
        placeholders: &'a mut Placeholders,
    ) -> Self {
        Self {
            partials,
            helpers,
            placeholders,
            depth: 0,
        }
    }

    /// Renders `template` with `context`. Errors are attributed to the
    /// template unless they already name an inner one.
    pub fn render(&mut self, template: &CompiledTemplate, context: &mut Context) -> StacheResult<String> {
        let mut out = String::new();
        self.render_nodes(template.nodes(), context, &mut out)
            .map_err(|e| e.in_template(template.name()))?;
        Ok(out)
    }

    pub(crate) fn render_nodes(
        &mut self,
        nodes: &[Node],
        context: &mut Context,
        out: &mut String,
    ) -> StacheResult<()> {
        for node in nodes {
            self.render_node(node, context, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, context: &mut Context, out: &mut String) -> StacheResult<()> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expression { call, escaped } => {
                let value = self.eval_expression(call, context)?;
                if *escaped && !value.is_safe() {
                    out.push_str(&escape_html(&value.to_display_string()));
                } else {
                    out.push_str(&value.to_display_string());
                }
            }
            Node::Partial {
                name,
                context: partial_context,
                hash,
            } => self.render_partial(name, partial_context.as_ref(), hash, context, out)?,
            Node::Block {
                call,
                body,
                inverse,
            } => {
                let value = self.eval_block(call, body, inverse, context)?;
                out.push_str(&value.to_display_string());
            }
        }
        Ok(())
    }

    fn eval_expression(&mut self, call: &Call, context: &mut Context) -> StacheResult<ContextValue> {
        let helpers = self.helpers;
        if let Some(helper) = call.path.simple_name().and_then(|name| helpers.get(name)) {
            return self.invoke(helper, call, None, &[], context);
        }
        if !call.is_bare() {
            return Err(missing_helper(call));
        }
        Ok(context.resolve(&call.path).unwrap_or(ContextValue::None))
    }

    fn eval_block(
        &mut self,
        call: &Call,
        body: &[Node],
        inverse: &[Node],
        context: &mut Context,
    ) -> StacheResult<ContextValue> {
        let helpers = self.helpers;
        if let Some(helper) = call.path.simple_name().and_then(|name| helpers.get(name)) {
            return self.invoke(helper, call, Some(body), inverse, context);
        }
        if !call.is_bare() {
            return Err(missing_helper(call));
        }

        // Plain section: iterate lists, enter truthy values, else the inverse.
        let value = context.resolve(&call.path).unwrap_or(ContextValue::None);
        let mut out = String::new();
        match &value {
            ContextValue::List(items) if !items.is_empty() => {
                for record in value.iteration() {
                    context.push_this(record.value);
                    set_iteration_data(context, record.key, record.index, record.first, record.last);
                    let result = self.render_nodes(body, context, &mut out);
                    context.pop();
                    result?;
                }
            }
            v if v.is_truthy() => {
                context.push_this(value.clone());
                let result = self.render_nodes(body, context, &mut out);
                context.pop();
                result?;
            }
            _ => self.render_nodes(inverse, context, &mut out)?,
        }
        Ok(ContextValue::SafeString(out))
    }

    fn invoke(
        &mut self,
        helper: &HelperFn,
        call: &Call,
        body: Option<&[Node]>,
        inverse: &[Node],
        context: &mut Context,
    ) -> StacheResult<ContextValue> {
        let params = call.params.iter().map(|p| p.resolve(context)).collect();
        let hash = call
            .hash
            .iter()
            .map(|(k, v)| (k.clone(), v.resolve(context)))
            .collect();
        let mut helper_call = HelperCall {
            name: call.path.as_str(),
            renderer: self,
            context,
            params,
            hash,
            body,
            inverse,
        };
        (**helper)(&mut helper_call)
    }

    fn render_partial(
        &mut self,
        name: &str,
        partial_context: Option<&Expression>,
        hash: &[(String, Expression)],
        context: &mut Context,
        out: &mut String,
    ) -> StacheResult<()> {
        let template = self.partials.get(name).cloned().ok_or_else(|| {
            StacheError::render(format!("The partial '{name}' could not be found"))
        })?;
        if self.depth >= MAX_PARTIAL_DEPTH {
            return Err(StacheError::render(format!(
                "Partial '{name}' nested more than {MAX_PARTIAL_DEPTH} levels deep"
            )));
        }

        let scope = partial_context.map(|expr| expr.resolve(context));
        let values: Vec<(String, ContextValue)> = hash
            .iter()
            .map(|(k, v)| (k.clone(), v.resolve(context)))
            .collect();

        let mut pushed = 0;
        if let Some(scope) = scope {
            context.push_this(scope);
            pushed += 1;
        }
        if !values.is_empty() {
            context.push();
            pushed += 1;
            for (k, v) in values {
                context.set(k, v);
            }
        }

        self.depth += 1;
        let result = self
            .render_nodes(template.nodes(), context, out)
            .map_err(|e| e.in_template(template.name()));
        self.depth -= 1;
        for _ in 0..pushed {
            context.pop();
        }
        result
    }
}

fn missing_helper(call: &Call) -> StacheError {
    StacheError::render(format!("Missing helper: '{}'", call.path.as_str()))
}

fn set_iteration_data(context: &mut Context, key: ContextValue, index: usize, first: bool, last: bool) {
    context.set("@key", key);
    context.set("@index", ContextValue::from(index));
    context.set("@first", ContextValue::Bool(first));
    context.set("@last", ContextValue::Bool(last));
}

/// One helper invocation: the resolved arguments plus access to the block
/// body, the context and the render's placeholders.
pub struct HelperCall<'r, 'a> {
    name: &'r str,
    renderer: &'r mut Renderer<'a>,
    context: &'r mut Context,
    params: Vec<ContextValue>,
    hash: BTreeMap<String, ContextValue>,
    body: Option<&'r [Node]>,
    inverse: &'r [Node],
}

impl HelperCall<'_, '_> {
    /// The helper name as written.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Positional arguments, resolved.
    pub fn params(&self) -> &[ContextValue] {
        &self.params
    }

    /// The positional argument at `index`.
    pub fn param(&self, index: usize) -> Option<&ContextValue> {
        self.params.get(index)
    }

    /// The hash argument `key`.
    pub fn hash(&self, key: &str) -> Option<&ContextValue> {
        self.hash.get(key)
    }

    /// All hash arguments.
    pub const fn hash_args(&self) -> &BTreeMap<String, ContextValue> {
        &self.hash
    }

    /// The current context.
    pub fn context(&self) -> &Context {
        &*self.context
    }

    /// The current context, mutably.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut *self.context
    }

    /// Whether the helper was called as a block (`{{#name}}`).
    pub const fn is_block(&self) -> bool {
        self.body.is_some()
    }

    /// The placeholders of this render.
    pub fn placeholders(&mut self) -> &mut Placeholders {
        &mut *self.renderer.placeholders
    }

    /// Renders the block body in the current context. Inline calls render
    /// nothing.
    pub fn render_block(&mut self) -> StacheResult<String> {
        let Some(body) = self.body else {
            return Ok(String::new());
        };
        let mut out = String::new();
        self.renderer.render_nodes(body, self.context, &mut out)?;
        Ok(out)
    }

    /// Renders the block body with `value` as the context object.
    pub fn render_block_with(&mut self, value: ContextValue) -> StacheResult<String> {
        self.context.push_this(value);
        let result = self.render_block();
        self.context.pop();
        result
    }

    /// Renders the block body for one iteration step, binding `@key`,
    /// `@index`, `@first` and `@last`.
    pub fn render_iteration(&mut self, record: IterRecord) -> StacheResult<String> {
        self.context.push_this(record.value);
        set_iteration_data(self.context, record.key, record.index, record.first, record.last);
        let result = self.render_block();
        self.context.pop();
        result
    }

    /// Renders the `{{else}}` branch in the current context.
    pub fn render_inverse(&mut self) -> StacheResult<String> {
        let mut out = String::new();
        self.renderer.render_nodes(self.inverse, self.context, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::helpers::HelperRegistry;
    use crate::parser;

    fn render_with(source: &str, partials: &PartialMap, ctx: &mut Context) -> StacheResult<String> {
        let helpers = HelperRegistry::with_builtins().snapshot();
        let mut placeholders = Placeholders::new();
        let template = parser::compile("test.hbs", source)?;
        Renderer::new(partials, &helpers, &mut placeholders).render(&template, ctx)
    }

    fn render(source: &str, json: serde_json::Value) -> String {
        let mut ctx = Context::from_json(json);
        render_with(source, &PartialMap::new(), &mut ctx).unwrap()
    }

    #[test]
    fn test_render_escaped_and_raw() {
        let json = serde_json::json!({"html": "<b>x</b>"});
        assert_eq!(render("{{html}}", json.clone()), "&lt;b&gt;x&lt;/b&gt;");
        assert_eq!(render("{{{html}}}", json.clone()), "<b>x</b>");
        assert_eq!(render("{{&html}}", json), "<b>x</b>");
    }

    #[test]
    fn test_render_missing_value_is_empty() {
        assert_eq!(render("[{{nope}}]", serde_json::json!({})), "[]");
        assert_eq!(render("[{{user.name}}]", serde_json::json!({"user": {}})), "[]");
    }

    #[test]
    fn test_render_section_over_list() {
        let out = render(
            "{{#items}}<{{this}}:{{@index}}>{{/items}}",
            serde_json::json!({"items": ["a", "b"]}),
        );
        assert_eq!(out, "<a:0><b:1>");
    }

    #[test]
    fn test_render_section_truthy_and_inverse() {
        let json = serde_json::json!({"user": {"name": "Ann"}, "empty": []});
        assert_eq!(render("{{#user}}{{name}}{{/user}}", json.clone()), "Ann");
        assert_eq!(render("{{^empty}}none{{/empty}}", json.clone()), "none");
        assert_eq!(render("{{#empty}}x{{else}}y{{/empty}}", json), "y");
    }

    #[test]
    fn test_render_parent_path_in_section() {
        let out = render(
            "{{#each items}}{{name}}@{{../site}} {{/each}}",
            serde_json::json!({"site": "S", "items": [{"name": "a"}, {"name": "b"}]}),
        );
        assert_eq!(out, "a@S b@S ");
    }

    #[test]
    fn test_render_partial_with_hash_and_context() {
        let mut partials = PartialMap::new();
        partials.insert(
            "card".to_string(),
            Arc::new(parser::compile("card", "<b>{{name}}</b>").unwrap()),
        );
        let mut ctx = Context::from_json(serde_json::json!({"name": "Ann", "other": {"name": "Bea"}}));
        assert_eq!(render_with("{{> card}}", &partials, &mut ctx).unwrap(), "<b>Ann</b>");
        assert_eq!(
            render_with("{{> card other}}", &partials, &mut ctx).unwrap(),
            "<b>Bea</b>"
        );
        assert_eq!(
            render_with("{{> card name=\"Cy\"}}", &partials, &mut ctx).unwrap(),
            "<b>Cy</b>"
        );
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_render_missing_partial_is_render_error() {
        let mut ctx = Context::new();
        let err = render_with("{{> nope}}", &PartialMap::new(), &mut ctx).unwrap_err();
        match err {
            StacheError::RenderError { path, message } => {
                assert_eq!(path, "test.hbs");
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_render_recursive_partial_is_bounded() {
        let mut partials = PartialMap::new();
        partials.insert(
            "loop".to_string(),
            Arc::new(parser::compile("loop", "x{{> loop}}").unwrap()),
        );
        let mut ctx = Context::new();
        let err = render_with("{{> loop}}", &partials, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("nested"));
    }

    #[test]
    fn test_render_missing_helper() {
        let mut ctx = Context::new();
        let err = render_with("{{shout name}}", &PartialMap::new(), &mut ctx).unwrap_err();
        assert!(err.to_string().contains("Missing helper"));
    }
}
