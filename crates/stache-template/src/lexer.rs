//! Template lexer (tokenizer).
//!
//! Converts raw template source text into a stream of [`Token`]s: text
//! literals, escaped and raw expressions (`{{ }}`, `{{{ }}}`), comments
//! (`{{! }}`), partial calls (`{{> }}`) and block delimiters (`{{# }}`,
//! `{{^ }}`, `{{else}}`, `{{/ }}`).

use stache_core::StacheError;

/// A token produced by the template lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal text segment.
    Text(String),
    /// An expression: `{{ expr }}` (escaped) or `{{{ expr }}}` / `{{& expr}}` (raw).
    Expression {
        /// The expression source, trimmed.
        content: String,
        /// Whether the output is HTML-escaped.
        escaped: bool,
    },
    /// A comment: `{{! text }}` or `{{!-- text --}}`.
    Comment(String),
    /// A partial call: `{{> name args }}`.
    Partial(String),
    /// A block opener: `{{# helper args }}`.
    OpenBlock(String),
    /// An inverted section opener: `{{^ name }}`.
    OpenInverse(String),
    /// The inverse separator: `{{else}}` or `{{^}}`.
    Else,
    /// A chained inverse: `{{else if cond}}` opens a nested block in the
    /// inverse branch that shares the outer closing tag.
    ElseChain(String),
    /// A block closer: `{{/ name }}`.
    CloseBlock(String),
}

/// Tokenizes a template source string into a sequence of [`Token`]s.
///
/// `name` is only used to attribute syntax errors.
pub fn tokenize(name: &str, source: &str) -> Result<Vec<Token>, StacheError> {
    let mut tokens = Vec::new();
    let mut remaining = source;

    while !remaining.is_empty() {
        let Some(pos) = remaining.find("{{") else {
            tokens.push(Token::Text(remaining.to_string()));
            break;
        };

        if pos > 0 {
            tokens.push(Token::Text(remaining[..pos].to_string()));
        }
        let opener = &remaining[pos..];
        let after_open = &remaining[pos + 2..];
        let (body, strip_before) = match after_open.strip_prefix('~') {
            Some(body) => (body, true),
            None => (after_open, false),
        };
        if strip_before {
            trim_trailing_text(&mut tokens);
        }

        let (token, rest, strip_after) = if let Some(inner) = body.strip_prefix('{') {
            // {{{ raw }}}
            let (end, next, strip) =
                find_close(inner, "}").ok_or_else(|| unclosed(name, "}}}", source, opener))?;
            let token = Token::Expression {
                content: inner[..end].trim().to_string(),
                escaped: false,
            };
            (token, &inner[next..], strip)
        } else if let Some(inner) = body.strip_prefix("!--") {
            let (end, next, strip) =
                find_close(inner, "--").ok_or_else(|| unclosed(name, "--}}", source, opener))?;
            (Token::Comment(inner[..end].trim().to_string()), &inner[next..], strip)
        } else {
            let (end, next, strip) =
                find_close(body, "").ok_or_else(|| unclosed(name, "}}", source, opener))?;
            (classify(name, body[..end].trim())?, &body[next..], strip)
        };

        tokens.push(token);
        remaining = if strip_after { rest.trim_start() } else { rest };
    }

    Ok(tokens)
}

/// Finds the end of a tag body closed by `term` then `}}`, with an optional
/// `~` before the braces. Returns the body end, the offset after the tag and
/// whether the `~` was present.
fn find_close(s: &str, term: &str) -> Option<(usize, usize, bool)> {
    let plain = format!("{term}}}}}");
    let tilde = format!("{term}~}}}}");
    match (s.find(&plain), s.find(&tilde)) {
        (Some(p), Some(t)) if t < p => Some((t, t + tilde.len(), true)),
        (Some(p), _) => Some((p, p + plain.len(), false)),
        (None, Some(t)) => Some((t, t + tilde.len(), true)),
        (None, None) => None,
    }
}

/// Drops trailing whitespace from the last text token (`{{~`).
fn trim_trailing_text(tokens: &mut Vec<Token>) {
    if let Some(Token::Text(text)) = tokens.last_mut() {
        let len = text.trim_end().len();
        text.truncate(len);
        if text.is_empty() {
            tokens.pop();
        }
    }
}

/// Classifies the content between `{{` and `}}` by its sigil.
fn classify(name: &str, content: &str) -> Result<Token, StacheError> {
    let mut chars = content.chars();
    let token = match chars.next() {
        Some('!') => Token::Comment(chars.as_str().trim().to_string()),
        Some('>') => Token::Partial(non_empty(name, chars.as_str(), "partial")?),
        Some('#') => Token::OpenBlock(non_empty(name, chars.as_str(), "block")?),
        Some('/') => Token::CloseBlock(non_empty(name, chars.as_str(), "closing tag")?),
        Some('&') => Token::Expression {
            content: non_empty(name, chars.as_str(), "expression")?,
            escaped: false,
        },
        Some('^') => {
            let rest = chars.as_str().trim();
            if rest.is_empty() {
                Token::Else
            } else {
                Token::OpenInverse(rest.to_string())
            }
        }
        Some(_) if content == "else" => Token::Else,
        Some(_) if content.starts_with("else ") => {
            Token::ElseChain(content["else ".len()..].trim().to_string())
        }
        Some(_) => Token::Expression {
            content: content.to_string(),
            escaped: true,
        },
        None => {
            return Err(StacheError::compile(name, "Empty expression '{{}}'"));
        }
    };
    Ok(token)
}

fn non_empty(name: &str, s: &str, what: &str) -> Result<String, StacheError> {
    let s = s.trim();
    if s.is_empty() {
        Err(StacheError::compile(name, format!("Missing name in {what}")))
    } else {
        Ok(s.to_string())
    }
}

/// Builds an unclosed-tag error carrying the line of the opener.
fn unclosed(name: &str, expected: &str, source: &str, remaining: &str) -> StacheError {
    let offset = source.len() - remaining.len();
    let line = source[..offset].matches('\n').count() + 1;
    StacheError::compile(
        name,
        format!("Unclosed tag on line {line}: expected '{expected}'"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(content: &str, escaped: bool) -> Token {
        Token::Expression {
            content: content.to_string(),
            escaped,
        }
    }

    #[test]
    fn test_whitespace_control_trims_neighbours() {
        let tokens = tokenize("t", "<ul>\n  {{~# each xs ~}}\n  <li>{{~this~}}</li>  {{~/each~}}\n</ul>").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("<ul>".into()),
                Token::OpenBlock("each xs".into()),
                Token::Text("<li>".into()),
                expr("this", true),
                Token::Text("</li>".into()),
                Token::CloseBlock("each".into()),
                Token::Text("</ul>".into()),
            ]
        );
    }

    #[test]
    fn test_whitespace_control_on_raw_and_comments() {
        let tokens = tokenize("t", "a {{~{ html }~}} b {{~!-- note --~}} c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a".into()),
                expr("html", false),
                Token::Text("b".into()),
                Token::Comment("note".into()),
                Token::Text("c".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_plain_text() {
        let tokens = tokenize("t", "Hello World").unwrap();
        assert_eq!(tokens, vec![Token::Text("Hello World".into())]);
    }

    #[test]
    fn test_tokenize_expressions() {
        let tokens = tokenize("t", "Hi {{ name }} {{{ html }}} {{& raw}}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hi ".into()),
                expr("name", true),
                Token::Text(" ".into()),
                expr("html", false),
                Token::Text(" ".into()),
                expr("raw", false),
            ]
        );
    }

    #[test]
    fn test_tokenize_comments() {
        let tokens = tokenize("t", "a{{! short }}b{{!-- has }} inside --}}c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a".into()),
                Token::Comment("short".into()),
                Token::Text("b".into()),
                Token::Comment("has }} inside".into()),
                Token::Text("c".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_layout_declaration() {
        let tokens = tokenize("t", "{{!< base}}x").unwrap();
        assert_eq!(tokens[0], Token::Comment("< base".into()));
    }

    #[test]
    fn test_tokenize_blocks() {
        let tokens =
            tokenize("t", "{{#if ok}}y{{else}}n{{/if}}{{^items}}none{{/items}}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::OpenBlock("if ok".into()),
                Token::Text("y".into()),
                Token::Else,
                Token::Text("n".into()),
                Token::CloseBlock("if".into()),
                Token::OpenInverse("items".into()),
                Token::Text("none".into()),
                Token::CloseBlock("items".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_else_chain() {
        let tokens = tokenize("t", "{{#if a}}1{{else if b}}2{{/if}}").unwrap();
        assert_eq!(tokens[2], Token::ElseChain("if b".into()));
    }

    #[test]
    fn test_tokenize_partial() {
        let tokens = tokenize("t", "{{> card name=\"x\"}}").unwrap();
        assert_eq!(tokens, vec![Token::Partial("card name=\"x\"".into())]);
    }

    #[test]
    fn test_tokenize_unclosed_reports_line() {
        let err = tokenize("page.hbs", "line1\n{{ oops").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("page.hbs"));
        assert!(msg.contains("line 2"));
    }

    #[test]
    fn test_tokenize_empty_expression() {
        assert!(tokenize("t", "{{ }}").is_err());
        assert!(tokenize("t", "{{#}}").is_err());
    }
}
