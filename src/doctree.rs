//! A simple XML document tree: parse a complete document into a
//! name/attributes/value/children structure and print it back.
//!
//! The tree is a light-weight structure for tooling around the analyzer,
//! like inspecting a document before configuring selectors. Whitespace-only
//! content is dropped on parse, so print followed by parse yields a tree
//! equal to the original modulo such content.

use std::fmt::Write as _;

use crate::errors::{Error, Result};
use crate::escape::escape;
use crate::segmenter::xml::{Scan, XmlScanner};
use crate::segmenter::ElementType;

/// One node of a parsed XML document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocTree {
    /// Tag name
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content of the node
    pub value: String,
    /// Child nodes in document order
    pub children: Vec<DocTree>,
}

impl DocTree {
    /// Creates a node with the given tag name.
    pub fn new(name: impl Into<String>) -> DocTree {
        DocTree {
            name: name.into(),
            ..DocTree::default()
        }
    }

    /// Parses an XML document into its tree.
    pub fn parse_xml(content: &str) -> Result<DocTree> {
        let mut scanner = XmlScanner::new();
        scanner.append(content);
        scanner.set_eof();

        let mut stack: Vec<DocTree> = Vec::new();
        let mut root: Option<DocTree> = None;
        let mut attr_name: Option<String> = None;
        loop {
            match scanner.next_event()? {
                Scan::Event(event) => {
                    let value = String::from_utf8_lossy(&event.value).into_owned();
                    match event.kind {
                        ElementType::OpenTag => {
                            if root.is_some() && stack.is_empty() {
                                return Err(Error::BadDocument(
                                    event.pos,
                                    "more than one root element".to_string(),
                                ));
                            }
                            stack.push(DocTree::new(value));
                        }
                        ElementType::TagAttribName => attr_name = Some(value),
                        ElementType::TagAttribValue => {
                            if let (Some(name), Some(node)) = (attr_name.take(), stack.last_mut()) {
                                node.attributes.push((name, value));
                            }
                        }
                        ElementType::Content => {
                            if let Some(node) = stack.last_mut() {
                                node.value.push_str(&value);
                            }
                        }
                        ElementType::CloseTag => {
                            let node = stack.pop().ok_or_else(|| {
                                Error::BadDocument(event.pos, "unbalanced close tag".to_string())
                            })?;
                            match stack.last_mut() {
                                Some(parent) => parent.children.push(node),
                                None => root = Some(node),
                            }
                        }
                        ElementType::Exit => {}
                    }
                }
                Scan::End => break,
                Scan::NeedMore => unreachable!("eof was declared"),
            }
        }
        root.ok_or_else(|| Error::BadDocument(0, "no root element".to_string()))
    }

    /// Prints the tree as an XML document.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.print_node(&mut out);
        out
    }

    fn print_node(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", name, escape(value));
        }
        if self.value.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(&self.value));
        for child in &self.children {
            child.print_node(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_print() {
        let tree = DocTree::parse_xml(r#"<doc id="1"><a>x</a><b/></doc>"#).unwrap();
        assert_eq!(tree.name, "doc");
        assert_eq!(tree.attributes, vec![("id".to_string(), "1".to_string())]);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.to_xml(), r#"<doc id="1"><a>x</a><b/></doc>"#);
    }

    #[test]
    fn round_trip_modulo_whitespace() {
        let source = "<doc>\n  <title>Hello &amp; bye</title>\n  <p a='1'>text</p>\n</doc>";
        let tree = DocTree::parse_xml(source).unwrap();
        let printed = tree.to_xml();
        assert_eq!(DocTree::parse_xml(&printed).unwrap(), tree);
    }

    #[test]
    fn rejects_multiple_roots() {
        assert!(matches!(
            DocTree::parse_xml("<a/><b/>"),
            Err(Error::BadDocument(..))
        ));
    }
}
