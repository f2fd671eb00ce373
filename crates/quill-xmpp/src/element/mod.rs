//! In-memory XML element tree.
//!
//! [`Element`] models one XML element: an optional namespace prefix, a
//! local name, insertion-ordered attributes, insertion-ordered child nodes
//! (elements or character data), and the prefix→URI namespace bindings in
//! scope at the element. Elements are value-like; the builder methods
//! consume and return the modified element.
//!
//! Serialization escapes exactly `<`, `>`, `&`, `'` and `"`. An element
//! without children serializes as `<tag/>`, otherwise with a close tag.

pub mod defs;

pub use defs::{SaslFailure, StanzaErrorCond, StreamErrorCond};

use std::collections::HashMap;
use std::fmt;

/// An attribute of an XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attr {
    /// Namespace prefix, empty when unprefixed.
    pub prefix: String,
    /// Local attribute name.
    pub name: String,
    /// Attribute value (unescaped).
    pub value: String,
}

/// A child node of an element: either a nested element or character data.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data (unescaped).
    Text(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Namespace prefix, empty when unprefixed.
    pub prefix: String,
    /// Local tag name.
    pub name: String,
    /// Prefix→URI namespace bindings in scope at this element. The empty
    /// prefix keys the default namespace.
    pub namespaces: HashMap<String, String>,
    /// Attributes, in insertion order.
    pub attrs: Vec<Attr>,
    /// Child nodes, in insertion order.
    pub children: Vec<Node>,
}

/// Splits `stream:features` into `("stream", "features")`; names without a
/// colon get an empty prefix.
fn decompose(tag: &str) -> (&str, &str) {
    match tag.split_once(':') {
        Some((prefix, name)) => (prefix, name),
        None => ("", tag),
    }
}

impl Element {
    /// Creates an element from a possibly-prefixed tag such as
    /// `stream:features` or `iq`.
    pub fn new(tag: &str) -> Element {
        let (prefix, name) = decompose(tag);
        Element {
            prefix: prefix.to_string(),
            name: name.to_string(),
            ..Element::default()
        }
    }

    /// Appends an attribute. The key may carry a prefix (`xml:lang`).
    ///
    /// `xmlns` and `xmlns:foo` attributes also update the element's
    /// namespace scope, so that [`Element::matches_namespace`] works on
    /// constructed elements the same way it does on parsed ones.
    pub fn with_attr(mut self, key: &str, value: &str) -> Element {
        let (prefix, name) = decompose(key);
        if prefix.is_empty() && name == "xmlns" {
            self.namespaces.insert(String::new(), value.to_string());
        } else if prefix == "xmlns" {
            self.namespaces.insert(name.to_string(), value.to_string());
        }
        self.attrs.push(Attr {
            prefix: prefix.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Appends a child element.
    pub fn with_child(mut self, child: Element) -> Element {
        self.children.push(Node::Element(child));
        self
    }

    /// Sets the text of the element: replaces the leading character data
    /// node if one exists, otherwise inserts one before the other children.
    pub fn with_text(mut self, text: &str) -> Element {
        if let Some(Node::Text(data)) = self.children.first_mut() {
            *data = text.to_string();
            return self;
        }
        self.children.insert(0, Node::Text(text.to_string()));
        self
    }

    /// The text of the element: the leading character data node, or `""`.
    pub fn text(&self) -> &str {
        match self.children.first() {
            Some(Node::Text(data)) => data,
            _ => "",
        }
    }

    /// Looks up an attribute value by key. The key may carry a prefix.
    pub fn attr(&self, key: &str) -> Option<&str> {
        let (prefix, name) = decompose(key);
        self.attrs
            .iter()
            .find(|a| a.prefix == prefix && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Looks up an attribute value, falling back to a default.
    pub fn attr_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.attr(key).unwrap_or(default)
    }

    /// All children that are elements themselves.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// The first child element with the given tag. A prefix in the tag must
    /// match exactly; a bare tag matches any prefix.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        let (prefix, name) = decompose(tag);
        self.child_elements()
            .find(|el| (prefix.is_empty() || el.prefix == prefix) && el.name == name)
    }

    /// The namespace URI this element's own prefix resolves to, if bound.
    pub fn namespace(&self) -> Option<&str> {
        self.namespaces.get(&self.prefix).map(String::as_str)
    }

    /// Whether this element's in-scope namespace equals `ns`.
    pub fn matches_namespace(&self, ns: &str) -> bool {
        self.namespace() == Some(ns)
    }

    /// Serializes the element.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(b'<');
        self.write_name(out);
        for attr in &self.attrs {
            out.push(b' ');
            if !attr.prefix.is_empty() {
                out.extend_from_slice(attr.prefix.as_bytes());
                out.push(b':');
            }
            out.extend_from_slice(attr.name.as_bytes());
            out.extend_from_slice(b"='");
            out.extend_from_slice(escape(&attr.value).as_bytes());
            out.push(b'\'');
        }
        if self.children.is_empty() {
            out.extend_from_slice(b"/>");
            return;
        }
        out.push(b'>');
        for child in &self.children {
            match child {
                Node::Element(el) => el.write(out),
                Node::Text(data) => out.extend_from_slice(escape(data).as_bytes()),
            }
        }
        out.extend_from_slice(b"</");
        self.write_name(out);
        out.push(b'>');
    }

    fn write_name(&self, out: &mut Vec<u8>) {
        if !self.prefix.is_empty() {
            out.extend_from_slice(self.prefix.as_bytes());
            out.push(b':');
        }
        out.extend_from_slice(self.name.as_bytes());
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Escapes `< > & ' "` and nothing else.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
