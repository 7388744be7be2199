//! Markup - Parse HTML-like fragments into detached nodes.
//!
//! This is the swap payload format: a server answers with a fragment of
//! markup and the host replaces a subtree with the parsed result. The parser
//! understands:
//!
//! - elements with quoted, unquoted and bare attributes
//! - void elements (`<br>`, `<img>`, ...) and self-closing tags (`<x/>`)
//! - text with the common named entities and numeric character references
//! - comments and doctypes, which are skipped
//!
//! Parsing produces detached nodes and queues no mutation records. Records
//! are produced only when the result is inserted into an observed tree.

use super::node::Node;
use crate::error::MarkupError;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Parse a markup fragment into its top-level nodes, in document order.
pub fn parse_fragment(input: &str) -> Result<Vec<Node>, MarkupError> {
    Parser { input, pos: 0 }.parse()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<Vec<Node>, MarkupError> {
        let mut top: Vec<Node> = Vec::new();
        // Open elements, innermost last.
        let mut open: Vec<(String, Node)> = Vec::new();

        let attach = |open: &[(String, Node)], top: &mut Vec<Node>, node: Node| {
            match open.last() {
                Some((_, parent)) => parent.adopt(node),
                None => top.push(node),
            }
        };

        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                let end = rest[4..]
                    .find("-->")
                    .ok_or(MarkupError::UnexpectedEof(self.input.len()))?;
                self.pos += 4 + end + 3;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').ok_or(MarkupError::UnexpectedEof(self.input.len()))?;
                self.pos += end + 1;
            } else if rest.starts_with("</") {
                let offset = self.pos;
                self.pos += 2;
                let name = self.tag_name()?;
                self.skip_whitespace();
                self.expect('>')?;
                match open.pop() {
                    Some((expected, _)) if expected == name => {}
                    Some((expected, _)) => {
                        return Err(MarkupError::MismatchedClose {
                            expected,
                            found: name,
                            offset,
                        });
                    }
                    None => return Err(MarkupError::UnexpectedClose { found: name, offset }),
                }
            } else if starts_tag(rest) {
                self.pos += 1;
                let name = self.tag_name()?;
                let element = Node::element(name.as_str());
                let self_closing = self.attributes(&element)?;
                let is_void = VOID_ELEMENTS.contains(&name.as_str());
                attach(&open, &mut top, element.clone());
                if !self_closing && !is_void {
                    open.push((name, element));
                }
            } else {
                let end = text_end(rest);
                let text = decode_entities(&rest[..end]);
                self.pos += end;
                attach(&open, &mut top, Node::text(text));
            }
        }

        if let Some((name, _)) = open.pop() {
            return Err(MarkupError::Unclosed(name));
        }
        Ok(top)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn expect(&mut self, c: char) -> Result<(), MarkupError> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(_) => Err(MarkupError::InvalidTagName(self.pos)),
            None => Err(MarkupError::UnexpectedEof(self.pos)),
        }
    }

    fn tag_name(&mut self) -> Result<String, MarkupError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(if rest.is_empty() {
                MarkupError::UnexpectedEof(self.pos)
            } else {
                MarkupError::InvalidTagName(self.pos)
            });
        }
        self.pos += len;
        Ok(rest[..len].to_ascii_lowercase())
    }

    fn attribute_name(&mut self) -> Result<String, MarkupError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\''))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(MarkupError::InvalidTagName(self.pos));
        }
        self.pos += len;
        Ok(rest[..len].to_ascii_lowercase())
    }

    /// Parse attributes up to the end of the start tag. Returns true for `/>`.
    fn attributes(&mut self, element: &Node) -> Result<bool, MarkupError> {
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(MarkupError::UnexpectedEof(self.pos)),
                Some('>') => {
                    self.pos += 1;
                    return Ok(false);
                }
                Some('/') => {
                    self.pos += 1;
                    self.expect('>')?;
                    return Ok(true);
                }
                Some(_) => {}
            }

            let name = self.attribute_name()?;
            self.skip_whitespace();
            let value = if self.peek() == Some('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value()?
            } else {
                String::new()
            };

            // First occurrence wins.
            if !element.has_attribute(&name) {
                element.adopt_attribute(name, value);
            }
        }
    }

    fn attribute_value(&mut self) -> Result<String, MarkupError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let rest = self.rest();
                let end = rest
                    .find(quote)
                    .ok_or(MarkupError::UnexpectedEof(self.input.len()))?;
                self.pos += end + 1;
                Ok(decode_entities(&rest[..end]))
            }
            Some(_) => {
                let rest = self.rest();
                let len = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(decode_entities(&rest[..len]))
            }
            None => Err(MarkupError::UnexpectedEof(self.pos)),
        }
    }
}

fn starts_tag(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn starts_markup(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

/// Byte length of the text run at the start of `rest`. A `<` that cannot
/// start markup is text.
fn text_end(rest: &str) -> usize {
    let first = rest.chars().next().map_or(0, char::len_utf8);
    rest[first..]
        .char_indices()
        .find(|&(i, c)| c == '<' && starts_markup(&rest[first + i..]))
        .map_or(rest.len(), |(i, _)| first + i)
}

/// Decode named entities and numeric character references.
/// Unknown or malformed references are kept literally.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            decode_entity(entity).map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
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

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
