use crate::ast::{Template, TemplatePart};
use crate::error::ParseResult;
use crate::parser::Parser;

/// Interpolation delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub open: &'static str,
    pub close: &'static str,
}

impl Delimiters {
    /// `{{ expression }}`, used in text and attributes
    pub const MUSTACHE: Delimiters = Delimiters {
        open: "{{",
        close: "}}",
    };

    /// `{% expression %}`, used inside `<style>` where `{{` collides with CSS blocks
    pub const STYLE: Delimiters = Delimiters {
        open: "{%",
        close: "%}",
    };
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::MUSTACHE
    }
}

/// Whether `text` contains an interpolation opener
pub fn has_interpolation(text: &str, delimiters: Delimiters) -> bool {
    text.contains(delimiters.open)
}

/// Split `text` into literal runs and parsed `{{ }}` expressions.
///
/// An opener without a matching closer is kept as literal text.
pub fn parse_template(text: &str, delimiters: Delimiters) -> ParseResult<Template> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(delimiters.open) {
        let open_at = cursor + found;
        let body_start = open_at + delimiters.open.len();

        let Some(close_at) = find_close(text, body_start, delimiters.close) else {
            break;
        };

        literal.push_str(&text[cursor..open_at]);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }

        let body = &text[body_start..close_at];
        if !body.trim().is_empty() {
            let expr = Parser::new(body)
                .and_then(|mut parser| parser.parse_complete())
                .map_err(|err| err.offset_by(body_start))?;
            parts.push(TemplatePart::Expression(expr));
        }

        cursor = close_at + delimiters.close.len();
    }

    literal.push_str(&text[cursor..]);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    Ok(Template { parts })
}

/// Locate the closing delimiter, skipping over quoted strings in the expression
fn find_close(text: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if text[i..].starts_with(close) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;

    #[test]
    fn test_literal_only() {
        let template = parse_template("plain text", Delimiters::MUSTACHE).unwrap();
        assert!(template.is_static());
        assert_eq!(template.parts, vec![TemplatePart::Literal("plain text".into())]);
    }

    #[test]
    fn test_mixed_parts() {
        let template = parse_template("Hello {{ name }}, {{count}}!", Delimiters::MUSTACHE).unwrap();
        assert_eq!(template.parts.len(), 5);
        assert!(matches!(
            &template.parts[1],
            TemplatePart::Expression(Expression::Variable { name, .. }) if name == "name"
        ));
        assert_eq!(template.parts[4], TemplatePart::Literal("!".into()));
    }

    #[test]
    fn test_closer_inside_string() {
        let template = parse_template(r#"{{ "}}" }}"#, Delimiters::MUSTACHE).unwrap();
        assert_eq!(template.parts.len(), 1);
        assert!(matches!(
            &template.parts[0],
            TemplatePart::Expression(Expression::Literal { value, .. }) if value == "}}"
        ));
    }

    #[test]
    fn test_unterminated_is_literal() {
        let template = parse_template("a {{ b", Delimiters::MUSTACHE).unwrap();
        assert_eq!(template.parts, vec![TemplatePart::Literal("a {{ b".into())]);
    }

    #[test]
    fn test_style_delimiters_leave_css_blocks_alone() {
        let template =
            parse_template(".a { color: {% color %}; }", Delimiters::STYLE).unwrap();
        assert_eq!(template.parts.len(), 3);
        assert_eq!(template.parts[0], TemplatePart::Literal(".a { color: ".into()));
    }

    #[test]
    fn test_error_offset_points_into_text() {
        let err = parse_template("ab {{ 1 + }}", Delimiters::MUSTACHE).unwrap_err();
        assert!(err.pos() >= 5);
    }
}
