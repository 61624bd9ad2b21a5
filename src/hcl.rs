//! Lexical scanner for Terraform HCL.
//!
//! This is not a parser. It tokenizes just enough of HCL to find block
//! boundaries and attributes reliably: quoted strings (including `${...}`
//! template interpolations that may themselves contain quotes and braces),
//! heredocs, and `#`, `//` and `/* */` comments are each consumed whole so
//! that braces inside them never affect nesting.
//!
//! [`Document`] wraps a token stream and answers the structural questions
//! the rest of the crate needs: where the top-level `resource` blocks are,
//! what an attribute's value spans, and which keys an object literal
//! defines.

use std::ops::Range;

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier: letters, digits, `_` and `-`, not starting with a digit.
    Ident,
    /// Quoted string or heredoc, delimiters included.
    Str,
    /// `{`, `(` or `[`.
    Open(u8),
    /// `}`, `)` or `]`.
    Close(u8),
    /// A lone `=` (not part of `==`, `<=`, `>=`, `!=` or `=>`).
    Assign,
    Colon,
    Comma,
    Newline,
    /// Anything else: numbers, operators, `.`, non-ASCII bytes.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Tokenize HCL source. Whitespace other than newlines and all comments are
/// dropped. Unterminated strings, heredocs and comments run to the end of
/// their line or of the input instead of failing.
pub fn tokenize(src: &str) -> Vec<Token> {
    let b = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let mut push = |kind, start, end| tokens.push(Token { kind, start, end });

    while i < b.len() {
        let c = b[i];
        let next = b.get(i + 1).copied();
        match c {
            b'\n' => {
                push(TokenKind::Newline, i, i + 1);
                i += 1;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'#' => i = line_end(b, i),
            b'/' if next == Some(b'/') => i = line_end(b, i),
            b'/' if next == Some(b'*') => {
                i = find(b, i + 2, b"*/").map(|p| p + 2).unwrap_or(b.len());
            }
            b'"' => {
                let end = skip_string(b, i);
                push(TokenKind::Str, i, end);
                i = end;
            }
            b'<' if next == Some(b'<') => match heredoc_end(b, i) {
                Some(end) => {
                    push(TokenKind::Str, i, end);
                    i = end;
                }
                None => {
                    push(TokenKind::Other, i, i + 2);
                    i += 2;
                }
            },
            b'{' | b'(' | b'[' => {
                push(TokenKind::Open(c), i, i + 1);
                i += 1;
            }
            b'}' | b')' | b']' => {
                push(TokenKind::Close(c), i, i + 1);
                i += 1;
            }
            b'=' if matches!(next, Some(b'=') | Some(b'>')) => {
                push(TokenKind::Other, i, i + 2);
                i += 2;
            }
            b'!' | b'<' | b'>' if next == Some(b'=') => {
                push(TokenKind::Other, i, i + 2);
                i += 2;
            }
            b'=' => {
                push(TokenKind::Assign, i, i + 1);
                i += 1;
            }
            b':' => {
                push(TokenKind::Colon, i, i + 1);
                i += 1;
            }
            b',' => {
                push(TokenKind::Comma, i, i + 1);
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < b.len() && is_ident_byte(b[i]) {
                    i += 1;
                }
                push(TokenKind::Ident, start, i);
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'.') {
                    i += 1;
                }
                push(TokenKind::Other, start, i);
            }
            _ => {
                push(TokenKind::Other, i, i + 1);
                i += 1;
            }
        }
    }

    tokens
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

/// Index of the `\n` ending the line containing `i`, or the input length.
fn line_end(b: &[u8], i: usize) -> usize {
    b[i..]
        .iter()
        .position(|&c| c == b'\n')
        .map(|p| i + p)
        .unwrap_or(b.len())
}

fn find(b: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= b.len() {
        return None;
    }
    b[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Skip a quoted string starting at `start` (which holds `"`). Returns the
/// index just past the closing quote. A raw newline ends the string early.
fn skip_string(b: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' => return i,
            b'$' | b'%' if b.get(i + 1) == Some(&b[i]) => i += 2,
            b'$' | b'%' if b.get(i + 1) == Some(&b'{') => i = skip_template(b, i + 2),
            _ => i += 1,
        }
    }
    b.len()
}

/// Skip a template interpolation body that starts after `${`. Returns the
/// index just past the matching `}`.
fn skip_template(b: &[u8], mut i: usize) -> usize {
    let mut depth = 1usize;
    while i < b.len() {
        match b[i] {
            b'"' => {
                i = skip_string(b, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    b.len()
}

/// If `start` opens a heredoc (`<<MARKER` or `<<-MARKER` followed by a
/// newline), return the index just past the closing marker line.
fn heredoc_end(b: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 2;
    if b.get(i) == Some(&b'-') {
        i += 1;
    }
    let marker_start = i;
    if !b.get(i).is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_') {
        return None;
    }
    while i < b.len() && is_ident_byte(b[i]) {
        i += 1;
    }
    let marker = &b[marker_start..i];
    while i < b.len() && matches!(b[i], b' ' | b'\t' | b'\r') {
        i += 1;
    }
    if b.get(i) != Some(&b'\n') {
        return None;
    }

    let mut line_start = i + 1;
    while line_start < b.len() {
        let end = line_end(b, line_start);
        if b[line_start..end].trim_ascii() == marker {
            return Some(end);
        }
        line_start = end + 1;
    }
    Some(b.len())
}

/// A top-level `resource "<type>" "<name>" { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBlock {
    pub resource_type: String,
    pub name: String,
    /// Byte offset of the `resource` keyword.
    pub start: usize,
    /// Token index of the opening brace.
    pub open: usize,
    /// Token index of the matching closing brace.
    pub close: usize,
}

/// An attribute (`name = value`) directly inside a block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Token index of the attribute name.
    pub name: usize,
    /// Token range of the value expression (non-empty).
    pub value: Range<usize>,
}

/// Tokenized HCL source.
pub struct Document<'a> {
    src: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Document<'a> {
    pub fn parse(src: &'a str) -> Self {
        Self {
            src,
            tokens: tokenize(src),
        }
    }

    pub fn src(&self) -> &'a str {
        self.src
    }

    pub fn token(&self, index: usize) -> Token {
        self.tokens[index]
    }

    pub fn text(&self, index: usize) -> &'a str {
        let t = self.tokens[index];
        &self.src[t.start..t.end]
    }

    fn kind(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|t| t.kind)
    }

    /// Token index of the bracket closing the one opened at `open`.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, t) in self.tokens.iter().enumerate().skip(open) {
            match t.kind {
                TokenKind::Open(_) => depth += 1,
                TokenKind::Close(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Top-level block headers as `(first token, opening brace token)`.
    ///
    /// A header is an identifier at depth zero that starts a line, followed
    /// by zero or more labels (strings or identifiers) and an opening brace.
    fn top_level_blocks(&self) -> Vec<(usize, usize)> {
        let mut blocks = Vec::new();
        let mut i = 0;
        let mut line_start = true;
        while i < self.tokens.len() {
            let kind = self.tokens[i].kind;
            if kind == TokenKind::Newline {
                line_start = true;
                i += 1;
                continue;
            }
            if line_start && kind == TokenKind::Ident {
                let mut j = i + 1;
                while matches!(self.kind(j), Some(TokenKind::Str) | Some(TokenKind::Ident)) {
                    j += 1;
                }
                if self.kind(j) == Some(TokenKind::Open(b'{')) {
                    match self.matching_close(j) {
                        Some(close) => {
                            blocks.push((i, j));
                            i = close + 1;
                            line_start = false;
                            continue;
                        }
                        None => break,
                    }
                }
            }
            line_start = false;
            i = match kind {
                TokenKind::Open(_) => match self.matching_close(i) {
                    Some(close) => close + 1,
                    None => break,
                },
                _ => i + 1,
            };
        }
        blocks
    }

    /// Every top-level `resource` block, in source order.
    pub fn resources(&self) -> Vec<ResourceBlock> {
        self.top_level_blocks()
            .into_iter()
            .filter(|&(head, open)| self.text(head) == "resource" && open == head + 3)
            .filter_map(|(head, open)| {
                Some(ResourceBlock {
                    resource_type: unquote(self.text(head + 1)).to_string(),
                    name: unquote(self.text(head + 2)).to_string(),
                    start: self.tokens[head].start,
                    open,
                    close: self.matching_close(open)?,
                })
            })
            .collect()
    }

    /// Byte range from the start of the first top-level block's line to the
    /// end of the last top-level block, or `None` if there are no blocks.
    pub fn block_extent(&self) -> Option<Range<usize>> {
        let blocks = self.top_level_blocks();
        let (first_head, _) = *blocks.first()?;
        let (_, last_open) = *blocks.last()?;
        let end = self.tokens[self.matching_close(last_open)?].end;
        Some(line_start(self.src, self.tokens[first_head].start)..end)
    }

    /// Find attribute `name` directly inside the block whose braces are the
    /// tokens `open` and `close`.
    pub fn attribute(&self, open: usize, close: usize, name: &str) -> Option<Attribute> {
        let mut depth = 0usize;
        for i in open + 1..close {
            match self.tokens[i].kind {
                TokenKind::Open(_) => depth += 1,
                TokenKind::Close(_) => depth = depth.saturating_sub(1),
                TokenKind::Ident if depth == 0 => {
                    let at_line_start =
                        matches!(self.kind(i - 1), Some(TokenKind::Newline)) || i - 1 == open;
                    if at_line_start
                        && self.text(i) == name
                        && self.kind(i + 1) == Some(TokenKind::Assign)
                    {
                        let value_start = i + 2;
                        let value_end = self.expression_end(value_start, close);
                        if value_end > value_start {
                            return Some(Attribute {
                                name: i,
                                value: value_start..value_end,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Exclusive token index where an expression starting at `start` ends:
    /// the first newline at its own nesting level, or `limit`.
    fn expression_end(&self, start: usize, limit: usize) -> usize {
        let mut depth = 0usize;
        let mut i = start;
        while i < limit {
            match self.tokens[i].kind {
                TokenKind::Open(_) => depth += 1,
                TokenKind::Close(_) => {
                    if depth == 0 {
                        return i;
                    }
                    depth -= 1;
                }
                TokenKind::Newline if depth == 0 => return i,
                _ => {}
            }
            i += 1;
        }
        limit
    }

    /// Byte range covered by an attribute's value.
    pub fn value_span(&self, attr: &Attribute) -> Range<usize> {
        self.tokens[attr.value.start].start..self.tokens[attr.value.end - 1].end
    }

    /// If the attribute value is a single object literal `{ ... }`, return
    /// its opening and closing brace token indices.
    pub fn object_literal(&self, attr: &Attribute) -> Option<(usize, usize)> {
        let open = attr.value.start;
        if self.kind(open) != Some(TokenKind::Open(b'{')) {
            return None;
        }
        let close = self.matching_close(open)?;
        (close + 1 == attr.value.end).then_some((open, close))
    }

    /// Keys defined at the top level of the object literal between the
    /// brace tokens `open` and `close`, with quotes removed.
    pub fn object_keys(&self, open: usize, close: usize) -> Vec<(usize, String)> {
        let mut keys = Vec::new();
        let mut depth = 0usize;
        for i in open + 1..close {
            match self.tokens[i].kind {
                TokenKind::Open(_) => depth += 1,
                TokenKind::Close(_) => depth = depth.saturating_sub(1),
                TokenKind::Ident | TokenKind::Str if depth == 0 => {
                    let starts_element = i - 1 == open
                        || matches!(
                            self.kind(i - 1),
                            Some(TokenKind::Newline) | Some(TokenKind::Comma)
                        );
                    let assigns =
                        matches!(self.kind(i + 1), Some(TokenKind::Assign) | Some(TokenKind::Colon));
                    if starts_element && assigns {
                        keys.push((i, unquote(self.text(i)).to_string()));
                    }
                }
                _ => {}
            }
        }
        keys
    }

    /// Whether `key` is assigned anywhere inside the token range, at any
    /// nesting depth. Used for non-literal expressions such as `merge(...)`.
    pub fn mentions_key(&self, range: Range<usize>, key: &str) -> bool {
        range.clone().any(|i| {
            matches!(self.tokens[i].kind, TokenKind::Ident | TokenKind::Str)
                && unquote(self.text(i)) == key
                && i + 1 < range.end
                && matches!(self.kind(i + 1), Some(TokenKind::Assign) | Some(TokenKind::Colon))
        })
    }

    /// Value of a plain string attribute (no interpolation) inside a block.
    pub fn string_attribute(&self, block: &ResourceBlock, name: &str) -> Option<&'a str> {
        let attr = self.attribute(block.open, block.close, name)?;
        if attr.value.len() != 1 || self.kind(attr.value.start) != Some(TokenKind::Str) {
            return None;
        }
        let raw = self.text(attr.value.start);
        let inner = unquote(raw);
        (raw.starts_with('"') && !inner.contains("${")).then_some(inner)
    }
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Render `value` as an HCL string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render `key` as an object key: bare when it scans as one identifier,
/// quoted otherwise (`"kubernetes.io/role/elb"`).
pub fn object_key(key: &str) -> String {
    let mut bytes = key.bytes();
    let is_ident = bytes
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
        && bytes.all(is_ident_byte);
    if is_ident {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Byte offset of the start of the line containing `pos`.
pub fn line_start(src: &str, pos: usize) -> usize {
    src[..pos].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

/// Leading whitespace of the line containing `pos`.
pub fn indent_at(src: &str, pos: usize) -> &str {
    let start = line_start(src, pos);
    let line = &src[start..];
    let width = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..width]
}

/// Whether only whitespace precedes `pos` on its line.
pub fn starts_line(src: &str, pos: usize) -> bool {
    src[line_start(src, pos)..pos].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_braces_inside_strings_are_not_structural() {
        let src = r#"name = "a{b}c${lookup(var.m, "k", "}")}""#;
        assert_eq!(
            kinds(src),
            vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Str]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        let src = "# {\n// }\n/* { } */ a = 1";
        let k = kinds(src);
        assert!(!k.iter().any(|k| matches!(k, TokenKind::Open(_) | TokenKind::Close(_))));
        assert!(k.contains(&TokenKind::Assign));
    }

    #[test]
    fn test_heredoc_is_one_token() {
        let src = "user_data = <<-EOT\n  echo ${HOME} {\n  EOT\nami = \"x\"\n";
        let tokens = tokenize(src);
        let heredoc = tokens[2];
        assert_eq!(heredoc.kind, TokenKind::Str);
        assert!(src[heredoc.start..heredoc.end].ends_with("EOT"));
        assert_eq!(tokens[3].kind, TokenKind::Newline);
        assert_eq!(&src[tokens[4].start..tokens[4].end], "ami");
    }

    #[test]
    fn test_comparison_is_not_assign() {
        let src = "count = var.a == 1 ? 1 : 0";
        let assigns = kinds(src)
            .into_iter()
            .filter(|k| *k == TokenKind::Assign)
            .count();
        assert_eq!(assigns, 1);
    }

    #[test]
    fn test_resources_found_in_order() {
        let src = r#"
provider "aws" {
  region = "us-east-1"
}

resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}

resource "aws_subnet" "public" {
  vpc_id = aws_vpc.main.id
  nested {
    resource = "not a block"
  }
}
"#;
        let doc = Document::parse(src);
        let resources = doc.resources();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].resource_type, "aws_vpc");
        assert_eq!(resources[0].name, "main");
        assert_eq!(resources[1].resource_type, "aws_subnet");
        assert_eq!(doc.text(resources[1].close), "}");
    }

    #[test]
    fn test_attribute_only_at_body_level() {
        let src = "resource \"a\" \"b\" {\n  block {\n    tags = {}\n  }\n}\n";
        let doc = Document::parse(src);
        let r = &doc.resources()[0];
        assert!(doc.attribute(r.open, r.close, "tags").is_none());
    }

    #[test]
    fn test_multiline_expression_value() {
        let src = "resource \"a\" \"b\" {\n  tags = merge(local.tags, {\n    Name = \"x\"\n  })\n  ami = \"y\"\n}\n";
        let doc = Document::parse(src);
        let r = &doc.resources()[0];
        let attr = doc.attribute(r.open, r.close, "tags").unwrap();
        assert!(doc.object_literal(&attr).is_none());
        assert!(doc.src()[doc.value_span(&attr)].ends_with("})"));
        assert!(doc.mentions_key(attr.value.clone(), "Name"));
        assert!(!doc.mentions_key(attr.value.clone(), "ManagedBy"));
    }

    #[test]
    fn test_object_keys_bare_and_quoted() {
        let src = "resource \"a\" \"b\" {\n  tags = {\n    Name = \"x\"\n    \"Team\" = \"y\", Cost: \"z\"\n    Nested = { Inner = 1 }\n  }\n}\n";
        let doc = Document::parse(src);
        let r = &doc.resources()[0];
        let attr = doc.attribute(r.open, r.close, "tags").unwrap();
        let (open, close) = doc.object_literal(&attr).unwrap();
        let keys: Vec<String> = doc.object_keys(open, close).into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["Name", "Team", "Cost", "Nested"]);
    }

    #[test]
    fn test_string_attribute() {
        let src = "resource \"aws_instance\" \"w\" {\n  instance_type = \"t2.small\"\n  ami = \"${var.ami}\"\n}\n";
        let doc = Document::parse(src);
        let r = &doc.resources()[0];
        assert_eq!(doc.string_attribute(r, "instance_type"), Some("t2.small"));
        assert_eq!(doc.string_attribute(r, "ami"), None);
        assert_eq!(doc.string_attribute(r, "missing"), None);
    }

    #[test]
    fn test_block_extent_skips_prose() {
        let src = "Here is the code:\n\nterraform {\n}\n\nresource \"a\" \"b\" {\n}\nHope it helps.";
        let doc = Document::parse(src);
        let extent = doc.block_extent().unwrap();
        let code = &src[extent];
        assert!(code.starts_with("terraform {"));
        assert!(code.ends_with('}'));
    }

    #[test]
    fn test_no_blocks_in_prose() {
        let doc = Document::parse("I cannot help with that request.");
        assert!(doc.block_extent().is_none());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("${x}"), "\"$${x}\"");
    }

    #[test]
    fn test_object_key_quotes_non_identifiers() {
        assert_eq!(object_key("CostCenter"), "CostCenter");
        assert_eq!(object_key("cost-center_2"), "cost-center_2");
        assert_eq!(object_key("kubernetes.io/role/elb"), "\"kubernetes.io/role/elb\"");
        assert_eq!(object_key("2fa"), "\"2fa\"");
        assert_eq!(object_key("team name"), "\"team name\"");
    }

    #[test]
    fn test_indent_helpers() {
        let src = "a {\n    b = 1\n}";
        let pos = src.find('b').unwrap();
        assert_eq!(indent_at(src, pos), "    ");
        assert!(starts_line(src, pos));
        assert!(!starts_line(src, src.find('1').unwrap()));
    }
}
