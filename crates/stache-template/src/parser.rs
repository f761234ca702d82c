//! Template parser.
//!
//! Converts a stream of lexer [`Token`]s into a [`CompiledTemplate`]: a tree
//! of [`Node`]s plus the optional parent-layout declaration. Handles path
//! expressions, literal arguments, hash arguments and nested blocks.

use stache_core::StacheError;

use crate::context::{Context, ContextValue};
use crate::lexer::{self, Token};

/// A parsed path such as `name`, `user.name`, `this`, `../title` or `@index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    /// Number of leading `../` segments.
    pub(crate) parents: usize,
    /// Whether the path starts with `@` (data variable).
    pub(crate) data: bool,
    /// Whether the path is anchored on `this` (or `.`).
    pub(crate) explicit_this: bool,
    /// The remaining segments.
    pub(crate) segments: Vec<String>,
    /// The path as written.
    pub(crate) original: String,
}

impl PathExpr {
    /// Returns the path as written in the template.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Returns the bare name when the path is a single plain identifier
    /// (a candidate helper name).
    pub fn simple_name(&self) -> Option<&str> {
        if self.parents == 0 && !self.data && !self.explicit_this && self.segments.len() == 1 {
            self.segments.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// Parses a path expression.
pub(crate) fn parse_path(s: &str) -> PathExpr {
    let original = s.to_string();
    let mut rest = s;
    let mut parents = 0;
    while let Some(stripped) = rest.strip_prefix("../") {
        parents += 1;
        rest = stripped;
    }
    if rest == ".." {
        parents += 1;
        rest = "";
    }

    let data = rest.starts_with('@');
    let rest = rest.trim_start_matches('@');

    let mut explicit_this = false;
    let mut segments = Vec::new();
    for (i, part) in rest.split(['.', '/']).enumerate() {
        if i == 0 && (part == "this" || part.is_empty()) && !data {
            explicit_this = true;
        } else if !part.is_empty() {
            segments.push(part.to_string());
        }
    }
    if rest.is_empty() {
        explicit_this = !data;
    }

    PathExpr {
        parents,
        data,
        explicit_this,
        segments,
        original,
    }
}

/// A parsed argument: a path or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A context path.
    Path(PathExpr),
    /// A string literal (`"hello"` or `'hello'`).
    String(String),
    /// A numeric literal.
    Number(f64),
    /// `true` or `false`.
    Bool(bool),
    /// `null` or `undefined`.
    Null,
}

impl Expression {
    /// Resolves this expression against a context. Missing paths resolve to
    /// [`ContextValue::None`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve(&self, context: &Context) -> ContextValue {
        match self {
            Self::Path(path) => context.resolve(path).unwrap_or(ContextValue::None),
            Self::String(s) => ContextValue::String(s.clone()),
            Self::Number(n) => {
                if n.fract() == 0.0 {
                    ContextValue::Integer(*n as i64)
                } else {
                    ContextValue::Float(*n)
                }
            }
            Self::Bool(b) => ContextValue::Bool(*b),
            Self::Null => ContextValue::None,
        }
    }
}

/// Parses a single argument (path or literal).
fn parse_expression(s: &str) -> Expression {
    if let Some(inner) = unquote(s) {
        return Expression::String(inner.to_string());
    }
    match s {
        "true" => return Expression::Bool(true),
        "false" => return Expression::Bool(false),
        "null" | "undefined" => return Expression::Null,
        _ => {}
    }
    if let Some(n) = parse_number(s) {
        return Expression::Number(n);
    }
    Expression::Path(parse_path(s))
}

/// Parses a numeric literal. Only digit-led forms count (`1`, `-2.5`,
/// `.5`), so names such as `inf` or `nan` stay paths.
fn parse_number(s: &str) -> Option<f64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let digits = digits.strip_prefix('.').unwrap_or(digits);
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A helper invocation or value lookup: `name param1 param2 key=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The leading path (helper name or value path).
    pub path: PathExpr,
    /// Positional parameters.
    pub params: Vec<Expression>,
    /// Hash (named) parameters, in source order.
    pub hash: Vec<(String, Expression)>,
}

impl Call {
    /// Returns `true` if the call has neither positional nor hash parameters.
    pub fn is_bare(&self) -> bool {
        self.params.is_empty() && self.hash.is_empty()
    }
}

fn parse_call(name: &str, content: &str) -> Result<Call, StacheError> {
    let args = split_args(name, content)?;
    let mut iter = args.into_iter();
    let head = iter
        .next()
        .ok_or_else(|| StacheError::compile(name, "Empty expression"))?;
    if unquote(&head).is_some() {
        return Err(StacheError::compile(
            name,
            format!("Expected a name or path, found literal {head}"),
        ));
    }

    let (params, hash) = split_params(iter);
    Ok(Call {
        path: parse_path(&head),
        params,
        hash,
    })
}

type Params = (Vec<Expression>, Vec<(String, Expression)>);

fn split_params(args: impl Iterator<Item = String>) -> Params {
    let mut params = Vec::new();
    let mut hash = Vec::new();
    for arg in args {
        match hash_pair(&arg) {
            Some((key, value)) => hash.push((key.to_string(), parse_expression(value))),
            None => params.push(parse_expression(&arg)),
        }
    }
    (params, hash)
}

/// Splits `key=value` when `key` is a plain identifier.
fn hash_pair(arg: &str) -> Option<(&str, &str)> {
    if unquote(arg).is_some() {
        return None;
    }
    let (key, value) = arg.split_once('=')?;
    let valid_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    (valid_key && !value.is_empty()).then_some((key, value))
}

/// Splits on whitespace, but not inside quotes.
fn split_args(name: &str, s: &str) -> Result<Vec<String>, StacheError> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in s.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(StacheError::compile(
            name,
            format!("Unterminated string literal in '{s}'"),
        ));
    }
    if !current.is_empty() {
        result.push(current);
    }
    Ok(result)
}

/// Returns the inner text of a quoted literal.
fn unquote(s: &str) -> Option<&str> {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    quoted.then(|| &s[1..s.len() - 1])
}

/// A node in the parsed template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A literal text segment.
    Text(String),
    /// A value lookup or inline helper call.
    Expression {
        /// The call.
        call: Call,
        /// Whether the output is HTML-escaped.
        escaped: bool,
    },
    /// A `{{> name}}` partial call.
    Partial {
        /// The partial name.
        name: String,
        /// An optional context object for the partial.
        context: Option<Expression>,
        /// Hash parameters pushed as an extra scope.
        hash: Vec<(String, Expression)>,
    },
    /// A `{{#name}}...{{else}}...{{/name}}` block.
    Block {
        /// The opening call.
        call: Call,
        /// The main branch.
        body: Vec<Node>,
        /// The `{{else}}` branch.
        inverse: Vec<Node>,
    },
}

/// A compiled template: an immutable node tree ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    name: String,
    nodes: Vec<Node>,
    parent_layout: Option<String>,
}

impl CompiledTemplate {
    /// The template name (usually the file path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed node tree.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The parent layout declared with a leading `{{!< parent}}` comment.
    pub fn parent_layout(&self) -> Option<&str> {
        self.parent_layout.as_deref()
    }
}

/// Compiles template source into a [`CompiledTemplate`].
///
/// # Errors
///
/// Returns `CompileError` for unclosed tags, mismatched block names, stray
/// `{{else}}` or closing tags, and malformed arguments.
pub fn compile(name: &str, source: &str) -> Result<CompiledTemplate, StacheError> {
    let tokens = lexer::tokenize(name, source)?;
    parse(name, &tokens)
}

/// Parses a list of tokens into a [`CompiledTemplate`].
pub fn parse(name: &str, tokens: &[Token]) -> Result<CompiledTemplate, StacheError> {
    let parent_layout = find_layout_declaration(tokens);
    let mut parser = ParserState::new(name, tokens);
    let (nodes, end) = parser.parse_nodes()?;

    match end {
        End::Eof => Ok(CompiledTemplate {
            name: name.to_string(),
            nodes,
            parent_layout,
        }),
        End::Else | End::ElseChain(_) => Err(StacheError::compile(
            name,
            "'{{else}}' outside of a block",
        )),
        End::Close(tag) => Err(StacheError::compile(
            name,
            format!("Unexpected closing tag '{{{{/{tag}}}}}'"),
        )),
    }
}

/// Finds `{{!< parent}}` when it is the first tag of the template.
fn find_layout_declaration(tokens: &[Token]) -> Option<String> {
    tokens
        .iter()
        .find(|t| !matches!(t, Token::Text(text) if text.trim().is_empty()))
        .and_then(|t| match t {
            Token::Comment(text) => text.strip_prefix('<').map(|n| strip_quotes(n.trim())),
            _ => None,
        })
        .filter(|name| !name.is_empty())
}

/// Removes one level of surrounding quotes.
pub fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    unquote(s).unwrap_or(s).to_string()
}

/// How a node sequence ended.
enum End {
    Eof,
    Else,
    ElseChain(String),
    Close(String),
}

struct ParserState<'a> {
    name: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ParserState<'a> {
    const fn new(name: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            name,
            tokens,
            pos: 0,
        }
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, End), StacheError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            match token {
                Token::Text(text) => nodes.push(Node::Text(text.clone())),
                Token::Comment(_) => {}
                Token::Expression { content, escaped } => nodes.push(Node::Expression {
                    call: parse_call(self.name, content)?,
                    escaped: *escaped,
                }),
                Token::Partial(content) => nodes.push(self.parse_partial(content)?),
                Token::OpenBlock(content) => nodes.push(self.parse_block(content)?),
                Token::OpenInverse(content) => nodes.push(self.parse_inverse(content)?),
                Token::Else => return Ok((nodes, End::Else)),
                Token::ElseChain(content) => return Ok((nodes, End::ElseChain(content.clone()))),
                Token::CloseBlock(tag) => return Ok((nodes, End::Close(tag.clone()))),
            }
        }

        Ok((nodes, End::Eof))
    }

    fn parse_partial(&self, content: &str) -> Result<Node, StacheError> {
        let args = split_args(self.name, content)?;
        let mut iter = args.into_iter();
        let name = iter
            .next()
            .map(|n| strip_quotes(&n))
            .ok_or_else(|| StacheError::compile(self.name, "Partial call without a name"))?;

        let (mut params, hash) = split_params(iter);
        if params.len() > 1 {
            return Err(StacheError::compile(
                self.name,
                format!("Partial '{name}' takes at most one context argument"),
            ));
        }
        Ok(Node::Partial {
            name,
            context: params.pop(),
            hash,
        })
    }

    /// Parses `{{#name ...}}` through its matching `{{/name}}`.
    fn parse_block(&mut self, content: &str) -> Result<Node, StacheError> {
        let call = parse_call(self.name, content)?;
        let tag = call.path.as_str().to_string();
        let (body, inverse) = self.parse_branches(&tag)?;
        Ok(Node::Block {
            call,
            body,
            inverse,
        })
    }

    /// Parses `{{^name}}...{{/name}}` as the inverse branch of a section.
    fn parse_inverse(&mut self, content: &str) -> Result<Node, StacheError> {
        let call = parse_call(self.name, content)?;
        let tag = call.path.as_str().to_string();
        let (inverse, body) = self.parse_branches(&tag)?;
        Ok(Node::Block {
            call,
            body,
            inverse,
        })
    }

    /// Parses the main branch and the optional `{{else}}` branch of a block
    /// whose closing tag is `tag`.
    fn parse_branches(&mut self, tag: &str) -> Result<(Vec<Node>, Vec<Node>), StacheError> {
        let (body, end) = self.parse_nodes()?;
        let inverse = match end {
            End::Close(close) => {
                self.check_close(tag, &close)?;
                Vec::new()
            }
            End::Else => {
                let (inverse, end) = self.parse_nodes()?;
                self.expect_close(tag, end)?;
                inverse
            }
            End::ElseChain(content) => {
                let call = parse_call(self.name, &content)?;
                let (chained_body, chained_inverse) = self.parse_branches(tag)?;
                vec![Node::Block {
                    call,
                    body: chained_body,
                    inverse: chained_inverse,
                }]
            }
            End::Eof => return Err(self.unclosed(tag)),
        };
        Ok((body, inverse))
    }

    fn expect_close(&self, tag: &str, end: End) -> Result<(), StacheError> {
        match end {
            End::Close(close) => self.check_close(tag, &close),
            End::Else | End::ElseChain(_) => Err(StacheError::compile(
                self.name,
                format!("Block '{tag}' has more than one '{{{{else}}}}'"),
            )),
            End::Eof => Err(self.unclosed(tag)),
        }
    }

    fn check_close(&self, tag: &str, close: &str) -> Result<(), StacheError> {
        if tag == close {
            Ok(())
        } else {
            Err(StacheError::compile(
                self.name,
                format!("'{tag}' doesn't match '{close}'"),
            ))
        }
    }

    fn unclosed(&self, tag: &str) -> StacheError {
        StacheError::compile(self.name, format!("Unclosed block '{tag}'"))
    }
}
