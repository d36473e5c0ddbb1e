// src/xml.rs
// Minimal element-tree reader/writer used for NETCONF envelopes, replies and payloads.
//
// Namespace declarations are kept as plain attributes; lookups go through
// local names so prefixed replies (`<nc:rpc-reply>`) classify the same way
// as unprefixed ones.

use std::fmt::Write as _;
use thiserror::Error;

/// Deepest element nesting the reader accepts. Parsing and dropping a tree
/// both recurse per level, so device input must stay well inside the stack.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String, // Qualified name as written, e.g. "nc:rpc-reply"
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("malformed markup at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedTag { expected: String, found: String },
    #[error("unknown entity '&{0};'")]
    UnknownEntity(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("trailing content after root element")]
    TrailingContent,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.local_name() == local_name)
    }

    /// Concatenated, trimmed text content of direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(text) = node {
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    pub fn child_text(&self, local_name: &str) -> Option<String> {
        self.child(local_name).map(Element::text)
    }

    pub fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    /// True when the element has neither child elements nor non-blank text.
    pub fn is_empty(&self) -> bool {
        !self.has_elements() && self.text().is_empty()
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", key, escape(value, true));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(element) => element.write_into(out),
                Node::Text(text) => out.push_str(&escape(text, false)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

pub fn escape(raw: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, XmlError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| XmlError::UnknownEntity(after.chars().take(8).collect()))?;
        let entity = &after[..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                let c = code
                    .and_then(char::from_u32)
                    .ok_or_else(|| XmlError::UnknownEntity(entity.to_string()))?;
                out.push(c);
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse a complete document into its root element.
pub fn parse(input: &str) -> Result<Element, XmlError> {
    let mut reader = Reader { src: input, pos: 0 };
    reader.skip_misc()?;
    if reader.at_end() {
        return Err(XmlError::NoRoot);
    }
    if !reader.rest().starts_with('<') {
        return Err(reader.malformed("text before root element"));
    }
    let root = reader.element(1)?;
    reader.skip_misc()?;
    if !reader.at_end() {
        return Err(XmlError::TrailingContent);
    }
    Ok(root)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn malformed(&self, reason: &str) -> XmlError {
        XmlError::Malformed {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    // Advances past `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str) -> Result<&'a str, XmlError> {
        let rest = self.rest();
        let idx = rest.find(terminator).ok_or(XmlError::UnexpectedEof)?;
        self.pos += idx + terminator.len();
        Ok(&rest[..idx])
    }

    // Prolog and epilog: whitespace, declarations, comments, doctype.
    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.take_until("?>")?;
            } else if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.take_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<&'a str, XmlError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>' || c == '=')
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.malformed("expected a name"));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    fn element(&mut self, depth: usize) -> Result<Element, XmlError> {
        if depth > MAX_DEPTH {
            return Err(self.malformed(&format!("elements nested deeper than {}", MAX_DEPTH)));
        }
        // Caller guarantees the cursor is on '<'.
        self.pos += 1;
        let mut element = Element::new(self.name()?);

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(XmlError::UnexpectedEof);
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(element);
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            let key = self.name()?.to_string();
            self.skip_whitespace();
            if !self.rest().starts_with('=') {
                return Err(self.malformed("expected '=' after attribute name"));
            }
            self.pos += 1;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                Some(_) => return Err(self.malformed("attribute value must be quoted")),
                None => return Err(XmlError::UnexpectedEof),
            };
            self.pos += 1;
            let raw = self.take_until(if quote == '"' { "\"" } else { "'" })?;
            element.attributes.push((key, unescape(raw)?));
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(XmlError::UnexpectedEof);
            }
            if rest.starts_with("</") {
                self.pos += 2;
                let found = self.take_until(">")?.trim();
                if found != element.name {
                    return Err(XmlError::MismatchedTag {
                        expected: element.name.clone(),
                        found: found.to_string(),
                    });
                }
                return Ok(element);
            } else if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.take_until("]]>")?;
                push_text(&mut element, data.to_string());
            } else if rest.starts_with("<?") {
                self.take_until("?>")?;
            } else if rest.starts_with('<') {
                let child = self.element(depth + 1)?;
                element.children.push(Node::Element(child));
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                push_text(&mut element, unescape(&rest[..end])?);
            }
        }
    }
}

fn push_text(element: &mut Element, text: String) {
    if let Some(Node::Text(previous)) = element.children.last_mut() {
        previous.push_str(&text);
    } else {
        element.children.push(Node::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_reply_with_declaration() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
            <nc:rpc-reply xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101">
              <nc:ok/>
            </nc:rpc-reply>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.local_name(), "rpc-reply");
        assert_eq!(root.attr("message-id"), Some("101"));
        assert!(root.child("ok").is_some());
    }

    #[test]
    fn unescapes_entities_and_cdata() {
        let root = parse("<a b='x &amp; y'>1 &lt; 2 &#x41;&#66;<![CDATA[<raw>]]></a>").unwrap();
        assert_eq!(root.attr("b"), Some("x & y"));
        assert_eq!(root.text(), "1 < 2 AB<raw>");
    }

    #[test]
    fn writer_escapes_and_collapses_empty_elements() {
        let element = Element::new("name")
            .with_attr("note", "a\"b")
            .with_child(Element::new("candidate"))
            .with_text("x<y");
        assert_eq!(
            element.to_xml(),
            "<name note=\"a&quot;b\"><candidate/>x&lt;y</name>"
        );
    }

    #[test]
    fn rejects_broken_documents() {
        assert_eq!(parse(""), Err(XmlError::NoRoot));
        assert_eq!(parse("<testing>"), Err(XmlError::UnexpectedEof));
        assert!(matches!(
            parse("<a><b></a>"),
            Err(XmlError::MismatchedTag { .. })
        ));
        assert_eq!(parse("<a/><b/>"), Err(XmlError::TrailingContent));
        assert!(matches!(parse("<a>&bogus;</a>"), Err(XmlError::UnknownEntity(_))));
    }

    #[test]
    fn nesting_is_bounded() {
        let at_limit = "<a>".repeat(MAX_DEPTH) + &"</a>".repeat(MAX_DEPTH);
        assert!(parse(&at_limit).is_ok());

        // Runs on a small stack so unbounded recursion would abort the test.
        let handle = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(|| {
                let deep = "<a>".repeat(50_000) + &"</a>".repeat(50_000);
                parse(&deep)
            })
            .unwrap();
        assert!(matches!(handle.join().unwrap(), Err(XmlError::Malformed { .. })));
    }

    #[test]
    fn blank_text_counts_as_empty() {
        let root = parse("<data>\n   </data>").unwrap();
        assert!(root.is_empty());
        let root = parse("<data><runner/></data>").unwrap();
        assert!(!root.is_empty());
    }
}
