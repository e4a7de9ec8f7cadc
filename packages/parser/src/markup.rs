use crate::ast::MarkupNode;
use crate::error::{ParseError, ParseResult};

/// Elements that never have children or a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching end tag
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parse an HTML fragment into markup nodes
pub fn parse_markup(source: &str) -> ParseResult<Vec<MarkupNode>> {
    MarkupParser::new(source).parse()
}

struct OpenElement {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<MarkupNode>,
}

struct MarkupParser<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> MarkupParser<'src> {
    fn new(source: &'src str) -> Self {
        Self { source, pos: 0 }
    }

    fn parse(mut self) -> ParseResult<Vec<MarkupNode>> {
        let mut roots = Vec::new();
        let mut stack: Vec<OpenElement> = Vec::new();

        while !self.is_at_end() {
            if self.starts_with("<!--") {
                let node = self.parse_comment()?;
                Self::push_node(&mut roots, &mut stack, node);
            } else if self.starts_with("<!") || self.starts_with("<?") {
                // doctype and processing instructions are dropped
                self.skip_past(">")?;
            } else if self.starts_with("</") {
                let tag = self.parse_end_tag()?;
                Self::close_element(&mut roots, &mut stack, &tag);
            } else if self.starts_with("<") && self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) {
                let (tag, attributes, self_closing) = self.parse_start_tag()?;

                if self_closing || is_void_element(&tag) {
                    let node = MarkupNode::Element {
                        tag,
                        attributes,
                        children: Vec::new(),
                    };
                    Self::push_node(&mut roots, &mut stack, node);
                } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let content = self.parse_raw_text(&tag);
                    let children = if content.is_empty() {
                        Vec::new()
                    } else {
                        vec![MarkupNode::Text { content }]
                    };
                    let node = MarkupNode::Element {
                        tag,
                        attributes,
                        children,
                    };
                    Self::push_node(&mut roots, &mut stack, node);
                } else {
                    stack.push(OpenElement {
                        tag,
                        attributes,
                        children: Vec::new(),
                    });
                }
            } else {
                let content = self.parse_text();
                Self::push_node(&mut roots, &mut stack, MarkupNode::Text { content });
            }
        }

        // unclosed elements are closed at end of input
        while let Some(open) = stack.pop() {
            let node = MarkupNode::Element {
                tag: open.tag,
                attributes: open.attributes,
                children: open.children,
            };
            Self::push_node(&mut roots, &mut stack, node);
        }

        Ok(roots)
    }

    fn push_node(roots: &mut Vec<MarkupNode>, stack: &mut [OpenElement], node: MarkupNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    /// Close `tag` and anything still open inside it; stray end tags are ignored
    fn close_element(roots: &mut Vec<MarkupNode>, stack: &mut Vec<OpenElement>, tag: &str) {
        if !stack.iter().any(|open| open.tag == tag) {
            return;
        }
        while let Some(open) = stack.pop() {
            let matched = open.tag == tag;
            let node = MarkupNode::Element {
                tag: open.tag,
                attributes: open.attributes,
                children: open.children,
            };
            Self::push_node(roots, stack, node);
            if matched {
                break;
            }
        }
    }

    fn parse_comment(&mut self) -> ParseResult<MarkupNode> {
        let start = self.pos;
        self.pos += "<!--".len();
        let rest = &self.source[self.pos..];
        let Some(end) = rest.find("-->") else {
            return Err(ParseError::unterminated(start, "comment"));
        };
        let content = rest[..end].to_string();
        self.pos += end + "-->".len();
        Ok(MarkupNode::Comment { content })
    }

    fn parse_end_tag(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += "</".len();
        let name = self.take_while(|c| !c.is_whitespace() && c != '>');
        self.skip_past(">")
            .map_err(|_| ParseError::unterminated(start, "end tag"))?;
        Ok(name.to_ascii_lowercase())
    }

    fn parse_start_tag(&mut self) -> ParseResult<(String, Vec<(String, String)>, bool)> {
        let start = self.pos;
        self.pos += 1;
        let tag = self
            .take_while(|c| !c.is_whitespace() && c != '>' && c != '/')
            .to_ascii_lowercase();
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::unterminated(start, format!("<{}> tag", tag))),
                Some('>') => {
                    self.pos += 1;
                    return Ok((tag, attributes, false));
                }
                Some('/') if self.peek_at(1) == Some('>') => {
                    self.pos += 2;
                    return Ok((tag, attributes, true));
                }
                Some('/') => {
                    self.pos += 1;
                }
                Some(_) => attributes.push(self.parse_attribute(start)?),
            }
        }
    }

    fn parse_attribute(&mut self, tag_start: usize) -> ParseResult<(String, String)> {
        let name = self
            .take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\''))
            .to_string();
        if name.is_empty() {
            // skip the offending character so the loop makes progress
            self.pos += 1;
            return Err(ParseError::invalid_syntax(self.pos - 1, "unexpected character in tag"));
        }

        self.skip_whitespace();
        if self.peek() != Some('=') {
            return Ok((name, String::new()));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let value_start = self.pos;
                self.pos += 1;
                let rest = &self.source[self.pos..];
                let Some(end) = rest.find(quote) else {
                    return Err(ParseError::unterminated(value_start, "attribute value"));
                };
                let raw = &rest[..end];
                self.pos += end + 1;
                decode_entities(raw)
            }
            Some(_) => decode_entities(self.take_while(|c| !c.is_whitespace() && c != '>')),
            None => return Err(ParseError::unterminated(tag_start, "tag")),
        };

        Ok((name, value))
    }

    fn parse_raw_text(&mut self, tag: &str) -> String {
        let closing = format!("</{}", tag);
        let rest = &self.source[self.pos..];
        let end = rest
            .to_ascii_lowercase()
            .find(&closing)
            .unwrap_or(rest.len());
        let content = rest[..end].to_string();
        self.pos += end;
        if !self.is_at_end() {
            // consume the end tag; an unterminated one just runs to end of input
            let _ = self.skip_past(">");
        }
        content
    }

    fn parse_text(&mut self) -> String {
        let start = self.pos;
        // a lone '<' that does not open a tag is text
        if self.peek() == Some('<') {
            self.pos += 1;
        }
        self.take_while(|c| c != '<');
        decode_entities(&self.source[start..self.pos])
    }

    // Helper methods

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'src str {
        let source = self.source;
        let start = self.pos;
        let rest = &source[start..];
        let len = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += len;
        &source[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn skip_past(&mut self, needle: &str) -> ParseResult<()> {
        match self.source[self.pos..].find(needle) {
            Some(i) => {
                self.pos += i + needle.len();
                Ok(())
            }
            None => Err(ParseError::unterminated(self.pos, format!("markup (missing '{}')", needle))),
        }
    }
}

/// Decode the common named and numeric character references
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &MarkupNode) -> (&str, &[(String, String)], &[MarkupNode]) {
        match node {
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => (tag, attributes, children),
            other => panic!("Expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_elements_and_text() {
        let nodes = parse_markup("<div class=\"box\"><p>Hello {{ name }}</p></div>").unwrap();
        assert_eq!(nodes.len(), 1);
        let (tag, attrs, children) = element(&nodes[0]);
        assert_eq!(tag, "div");
        assert_eq!(attrs, &[("class".to_string(), "box".to_string())]);
        let (tag, _, children) = element(&children[0]);
        assert_eq!(tag, "p");
        assert_eq!(
            children[0],
            MarkupNode::Text {
                content: "Hello {{ name }}".into()
            }
        );
    }

    #[test]
    fn test_directive_attributes_keep_prefixes() {
        let nodes =
            parse_markup("<li :for=\"x of list\" @click='pick(x)' $title=\"x.name\" hidden>{{x}}</li>")
                .unwrap();
        let (_, attrs, _) = element(&nodes[0]);
        let names: Vec<_> = attrs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![":for", "@click", "$title", "hidden"]);
        assert_eq!(attrs[3].1, "");
    }

    #[test]
    fn test_void_and_self_closing() {
        let nodes = parse_markup("<input :model=\"name\"><br/><span/>after").unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(
            nodes[3],
            MarkupNode::Text {
                content: "after".into()
            }
        );
    }

    #[test]
    fn test_style_is_raw_text() {
        let nodes = parse_markup("<style>.a > b { color: {% c %}; }</style>").unwrap();
        let (_, _, children) = element(&nodes[0]);
        assert_eq!(
            children[0],
            MarkupNode::Text {
                content: ".a > b { color: {% c %}; }".into()
            }
        );
    }

    #[test]
    fn test_comments_and_doctype() {
        let nodes = parse_markup("<!DOCTYPE html><!-- note --><p></p>").unwrap();
        assert_eq!(
            nodes[0],
            MarkupNode::Comment {
                content: " note ".into()
            }
        );
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_unclosed_elements_close_at_end() {
        let nodes = parse_markup("<ul><li>a<li>b").unwrap();
        let (tag, _, children) = element(&nodes[0]);
        assert_eq!(tag, "ul");
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let nodes = parse_markup("<p>a</span></p>").unwrap();
        let (_, _, children) = element(&nodes[0]);
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        let err = parse_markup("<p><!-- open").unwrap_err();
        assert!(matches!(err, ParseError::Unterminated { pos: 3, .. }));
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;3 &#65;&#x42; &bogus"), "a & b <3 AB &bogus");
    }
}
