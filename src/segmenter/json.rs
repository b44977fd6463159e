//! The JSON segmenter.
//!
//! JSON content is buffered until the end of input, parsed into a value
//! tree and linearized into the same event stream the XML segmenter
//! produces, so that one set of selector expressions works across both
//! formats:
//!
//! - object field `-name` becomes an attribute (the `-` is stripped),
//! - object field `#text` becomes content of the enclosing tag,
//! - a keyless array wraps its elements in numeric synthetic tags,
//! - an array under key `k` repeats a `k` tag per element,
//! - a scalar under key `k` becomes open tag, content, close tag.
//!
//! Event positions are synthetic: each linearized element advances the
//! position by its value length plus one, which keeps the stream strictly
//! monotone. A concatenation of top-level documents is split with
//! [`skip_end_of_next_document`] and parsed document by document.

use serde_json::Value;

use crate::docclass::DocumentClass;
use crate::errors::{Error, Result};
use crate::segmenter::{
    encoder_for_class, ElementType, Fetch, SegmentEvent, SegmenterContext, SegmenterInstance,
};
use crate::xpath::XPathAutomaton;

/// Returns the byte position just past the first complete top-level JSON
/// document in `bytes`, or `None` when the document is not complete.
///
/// Brace and bracket matching is aware of string literals including
/// escaped quotes, so `{"a":"}"}` splits correctly.
pub fn skip_end_of_next_document(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0i64;
    let mut at = 0;
    while at < bytes.len() {
        match bytes[at] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth <= 0 {
                    return Some(at + 1);
                }
            }
            quote @ (b'"' | b'\'') => {
                at += 1;
                while at < bytes.len() && bytes[at] != quote {
                    if bytes[at] == b'\\' {
                        at += 1;
                    }
                    at += 1;
                }
                if at >= bytes.len() {
                    return None;
                }
            }
            _ => {}
        }
        at += 1;
    }
    None
}

/// One element of the linearized tree.
struct TreeItem {
    kind: ElementType,
    value: String,
}

fn push_value(items: &mut Vec<TreeItem>, key: Option<&str>, value: String) {
    match key {
        Some(name) if name.starts_with('-') => {
            items.push(TreeItem {
                kind: ElementType::TagAttribName,
                value: name[1..].to_string(),
            });
            items.push(TreeItem {
                kind: ElementType::TagAttribValue,
                value,
            });
        }
        Some(name) if name == "#text" => {
            items.push(TreeItem {
                kind: ElementType::Content,
                value,
            });
        }
        Some(name) => {
            items.push(TreeItem {
                kind: ElementType::OpenTag,
                value: name.to_string(),
            });
            items.push(TreeItem {
                kind: ElementType::Content,
                value,
            });
            items.push(TreeItem {
                kind: ElementType::CloseTag,
                value: name.to_string(),
            });
        }
        None => {
            items.push(TreeItem {
                kind: ElementType::Content,
                value,
            });
        }
    }
}

fn open_close(items: &mut Vec<TreeItem>, name: &str, build: impl FnOnce(&mut Vec<TreeItem>)) {
    items.push(TreeItem {
        kind: ElementType::OpenTag,
        value: name.to_string(),
    });
    build(items);
    items.push(TreeItem {
        kind: ElementType::CloseTag,
        value: name.to_string(),
    });
}

/// Linearizes one JSON node into structure events, the enclosing object
/// key in `key`.
fn linearize(items: &mut Vec<TreeItem>, key: Option<&str>, node: &Value) {
    match node {
        Value::Null => {
            if let Some(name) = key {
                if !name.starts_with('-') && !name.starts_with('#') {
                    open_close(items, name, |_| {});
                }
            }
        }
        Value::Bool(val) => push_value(items, key, if *val { "true" } else { "false" }.to_string()),
        Value::Number(num) => push_value(items, key, num.to_string()),
        Value::String(text) => push_value(items, key, text.clone()),
        Value::Array(elements) => {
            if let Some(name) = key {
                for element in elements {
                    open_close(items, name, |items| linearize(items, None, element));
                }
            } else {
                for (idx, element) in elements.iter().enumerate() {
                    open_close(items, &idx.to_string(), |items| {
                        linearize(items, None, element)
                    });
                }
            }
        }
        Value::Object(fields) => {
            let build = |items: &mut Vec<TreeItem>| {
                for (field_key, field_value) in fields {
                    linearize(items, Some(field_key), field_value);
                }
            };
            match key {
                Some(name) => open_close(items, name, build),
                None => build(items),
            }
        }
    }
}

/// The JSON segmenter. Holds the compiled selection automaton shared by
/// all of its contexts.
#[derive(Debug, Default)]
pub struct JsonSegmenter {
    automaton: XPathAutomaton,
}

impl JsonSegmenter {
    /// Creates a segmenter with no selectors defined.
    pub fn new() -> JsonSegmenter {
        JsonSegmenter::default()
    }
}

impl SegmenterInstance for JsonSegmenter {
    fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()> {
        self.automaton.define_selector_expression(id, expression)
    }

    fn define_subsection(&mut self, start_id: u32, end_id: u32, expression: &str) -> Result<()> {
        self.automaton.define_subsection(start_id, end_id, expression)
    }

    fn create_context<'a>(
        &'a self,
        class: &DocumentClass,
    ) -> Result<Box<dyn SegmenterContext + 'a>> {
        Ok(Box::new(JsonSegmenterContext {
            automaton: &self.automaton,
            encoder: encoder_for_class(class)?,
            content: String::new(),
            eof: false,
            items: Vec::new(),
            parsed: false,
            at: 0,
        }))
    }

    fn mime_type(&self) -> &'static str {
        crate::docclass::MIME_JSON
    }
}

struct EmittedItem {
    id: u32,
    pos: u64,
    bytes: Vec<u8>,
}

/// One-document parsing context of the [`JsonSegmenter`].
pub struct JsonSegmenterContext<'a> {
    automaton: &'a XPathAutomaton,
    encoder: crate::encoding::TextEncoder,
    content: String,
    eof: bool,
    items: Vec<EmittedItem>,
    parsed: bool,
    at: usize,
}

impl JsonSegmenterContext<'_> {
    /// Splits, parses and linearizes the buffered content, collecting all
    /// matched segments.
    fn parse_content(&mut self) -> Result<()> {
        self.parsed = true;
        let content = self.content.as_bytes();
        let mut doc_start = 0usize;
        let mut position = 0u64;
        loop {
            let rest = &content[doc_start..];
            let skipped = rest.iter().take_while(|&&b| b <= 32).count();
            if skipped == rest.len() {
                return Ok(());
            }
            let doc_end = match skip_end_of_next_document(&rest[skipped..]) {
                Some(end) => doc_start + skipped + end,
                None => {
                    return Err(Error::BadDocument(
                        doc_start as u64,
                        "JSON document is not balanced".to_string(),
                    ))
                }
            };
            let tree: Value = serde_json::from_slice(&content[doc_start + skipped..doc_end])
                .map_err(|err| {
                    Error::BadDocument((doc_start + skipped) as u64, err.to_string())
                })?;
            let mut tree_items = Vec::new();
            linearize(&mut tree_items, None, &tree);
            let mut select = self.automaton.create_context();
            for item in &tree_items {
                select.put_element(item.kind, item.value.as_bytes());
                while let Some(id) = select.next_match() {
                    self.items.push(EmittedItem {
                        id,
                        pos: position,
                        bytes: item.value.as_bytes().to_vec(),
                    });
                }
                position += item.value.len() as u64 + 1;
            }
            doc_start = doc_end;
        }
    }
}

impl SegmenterContext for JsonSegmenterContext<'_> {
    fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        if self.eof {
            return Err(Error::OperationOrder(
                "input fed after declared end of input".to_string(),
            ));
        }
        let converted = self.encoder.convert(chunk, eof)?;
        if self.content.is_empty() {
            self.content
                .push_str(converted.strip_prefix('\u{feff}').unwrap_or(&converted));
        } else {
            self.content.push_str(&converted);
        }
        self.eof = eof;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Fetch<'_>> {
        if !self.eof {
            return Ok(Fetch::NeedMore);
        }
        if !self.parsed {
            self.parse_content()?;
        }
        match self.items.get(self.at) {
            Some(item) => {
                self.at += 1;
                Ok(Fetch::Event(SegmentEvent {
                    id: item.id,
                    position: item.pos,
                    bytes: &item.bytes,
                }))
            }
            None => Ok(Fetch::EndOfStream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn events(json: &str, selectors: &[(u32, &str)]) -> Vec<(u32, u64, String)> {
        let mut segmenter = JsonSegmenter::new();
        for (id, expr) in selectors {
            segmenter.define_selector_expression(*id, expr).unwrap();
        }
        let mut ctx = segmenter.create_context(&DocumentClass::json()).unwrap();
        ctx.put_input(json.as_bytes(), true).unwrap();
        let mut out = Vec::new();
        loop {
            match ctx.get_next().unwrap() {
                Fetch::Event(ev) => out.push((
                    ev.id,
                    ev.position,
                    String::from_utf8(ev.bytes.to_vec()).unwrap(),
                )),
                Fetch::EndOfStream => return out,
                Fetch::NeedMore => panic!("NeedMore after eof"),
            }
        }
    }

    #[test]
    fn scalar_field_selection() {
        let out = events(r#"{"k":"v"}"#, &[(1, "/k()")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        assert_eq!(out[0].2, "v");
    }

    #[test]
    fn attribute_and_text_conventions() {
        let out = events(
            r##"{"a":{"-id":"7","#text":"x"}}"##,
            &[(1, "/a@id"), (2, "/a()")],
        );
        assert_eq!(
            out.into_iter().map(|(id, _, val)| (id, val)).collect::<Vec<_>>(),
            vec![(1, "7".to_string()), (2, "x".to_string())]
        );
    }

    #[test]
    fn keyed_array_repeats_tag() {
        let out = events(r#"{"w":["a","b"]}"#, &[(1, "//w()")]);
        assert_eq!(
            out.iter().map(|(_, _, val)| val.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        // positions advance between the two elements
        assert!(out[0].1 < out[1].1);
    }

    #[test]
    fn keyless_array_uses_numeric_tags() {
        let out = events(r#"{"l":[["x","y"]]}"#, &[(1, "/l/0()"), (2, "/l/1()")]);
        assert_eq!(
            out.into_iter().map(|(id, _, val)| (id, val)).collect::<Vec<_>>(),
            vec![(1, "x".to_string()), (2, "y".to_string())]
        );
    }

    #[test]
    fn null_is_an_empty_tag() {
        let out = events(r#"{"doc":{"flag":null}}"#, &[(5, "/doc/flag")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].2, "flag");
    }

    #[test]
    fn number_and_bool_render_as_text() {
        let out = events(r#"{"n":42,"b":true}"#, &[(1, "/n()"), (2, "/b()")]);
        assert_eq!(
            out.into_iter().map(|(id, _, val)| (id, val)).collect::<Vec<_>>(),
            vec![(1, "42".to_string()), (2, "true".to_string())]
        );
    }

    #[test]
    fn concatenated_documents_split() {
        let out = events("{\"a\":\"1\"} {\"a\":\"2\"}", &[(1, "/a()")]);
        assert_eq!(
            out.iter().map(|(_, _, val)| val.as_str()).collect::<Vec<_>>(),
            vec!["1", "2"]
        );
        assert!(out[0].1 < out[1].1);
    }

    #[test]
    fn splitter_is_string_aware() {
        let doc = br#"{"a":"}\"}"}"#;
        assert_eq!(skip_end_of_next_document(doc), Some(doc.len()));
        assert_eq!(skip_end_of_next_document(b"{\"a\":1"), None);
    }
}
