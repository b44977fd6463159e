//! Document markup: the mutation mode of the XML segmenter.
//!
//! A [`MarkupContext`] takes a complete document and a set of tag markups
//! addressed by byte position, and renders the document with the markups
//! spliced in. It is used to write token annotations back into the source
//! document. Only the XML segmenter can create one; the other variants
//! report [`NotImplemented`](crate::Error::NotImplemented).

use crate::docclass::DocumentClass;
use crate::encoding::detect_bom;
use crate::errors::{Error, Result};
use crate::escape::escape;
use crate::segmenter::encoder_for_class;

#[derive(Clone, Debug)]
enum InsertKind {
    OpenTag {
        name: String,
        attributes: Vec<(String, String)>,
    },
    CloseTag {
        name: String,
    },
}

#[derive(Clone, Debug)]
struct Insert {
    pos: u64,
    kind: InsertKind,
}

/// A markup editing context over one decoded document.
#[derive(Clone, Debug)]
pub struct MarkupContext {
    content: String,
    inserts: Vec<Insert>,
}

impl MarkupContext {
    /// Creates a markup context for an XML document, decoding it with the
    /// declared or detected character set and checking well-formedness.
    pub(crate) fn for_xml(class: &DocumentClass, content: &[u8]) -> Result<MarkupContext> {
        let mut encoder = if class.encoding.is_some() {
            encoder_for_class(class)?
        } else {
            match detect_bom(content) {
                Some((name, _)) => crate::encoding::TextEncoder::for_name(name)?,
                None => crate::encoding::TextEncoder::utf8(),
            }
        };
        let text = encoder.convert(content, true)?;
        let text = match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        };
        let context = MarkupContext {
            content: text,
            inserts: Vec::new(),
        };
        context.check_well_formed()?;
        Ok(context)
    }

    fn check_well_formed(&self) -> Result<()> {
        let mut scanner = crate::segmenter::xml::XmlScanner::new();
        scanner.append(&self.content);
        scanner.set_eof();
        loop {
            match scanner.next_event()? {
                crate::segmenter::xml::Scan::Event(_) => {}
                crate::segmenter::xml::Scan::End => return Ok(()),
                crate::segmenter::xml::Scan::NeedMore => unreachable!("eof was declared"),
            }
        }
    }

    /// The decoded document content without markups.
    pub fn source(&self) -> &str {
        &self.content
    }

    /// Inserts an open tag markup at the given byte position. Returns a
    /// handle for attaching attributes.
    pub fn put_open_tag(&mut self, position: u64, name: impl Into<String>) -> Result<usize> {
        self.check_position(position)?;
        self.inserts.push(Insert {
            pos: position,
            kind: InsertKind::OpenTag {
                name: name.into(),
                attributes: Vec::new(),
            },
        });
        Ok(self.inserts.len() - 1)
    }

    /// Attaches an attribute to a previously inserted open tag markup.
    pub fn put_attribute(
        &mut self,
        markup: usize,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        match self.inserts.get_mut(markup) {
            Some(Insert {
                kind: InsertKind::OpenTag { attributes, .. },
                ..
            }) => {
                attributes.push((name.into(), value.into()));
                Ok(())
            }
            _ => Err(Error::InvalidArgument(format!(
                "no open tag markup with handle {}",
                markup
            ))),
        }
    }

    /// Inserts a close tag markup at the given byte position.
    pub fn put_close_tag(&mut self, position: u64, name: impl Into<String>) -> Result<()> {
        self.check_position(position)?;
        self.inserts.push(Insert {
            pos: position,
            kind: InsertKind::CloseTag { name: name.into() },
        });
        Ok(())
    }

    fn check_position(&self, position: u64) -> Result<()> {
        if position as usize > self.content.len() || !self.content.is_char_boundary(position as usize)
        {
            return Err(Error::InvalidArgument(format!(
                "markup position {} is not a character boundary of the document",
                position
            )));
        }
        Ok(())
    }

    /// Renders the document with all markups spliced in. At equal
    /// positions close tags are written before open tags, so that
    /// back-to-back token markups nest correctly.
    pub fn render(&self) -> String {
        let mut order: Vec<usize> = (0..self.inserts.len()).collect();
        order.sort_by_key(|&idx| {
            let insert = &self.inserts[idx];
            let close_rank = match insert.kind {
                InsertKind::CloseTag { .. } => 0u8,
                InsertKind::OpenTag { .. } => 1u8,
            };
            (insert.pos, close_rank, idx)
        });
        let mut out = String::with_capacity(self.content.len() + self.inserts.len() * 8);
        let mut at = 0usize;
        for idx in order {
            let insert = &self.inserts[idx];
            let pos = insert.pos as usize;
            out.push_str(&self.content[at..pos]);
            at = pos;
            match &insert.kind {
                InsertKind::OpenTag { name, attributes } => {
                    out.push('<');
                    out.push_str(name);
                    for (attr_name, attr_value) in attributes {
                        out.push(' ');
                        out.push_str(attr_name);
                        out.push_str("=\"");
                        out.push_str(&escape(attr_value));
                        out.push('"');
                    }
                    out.push('>');
                }
                InsertKind::CloseTag { name } => {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
        }
        out.push_str(&self.content[at..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn xml_context(content: &str) -> MarkupContext {
        MarkupContext::for_xml(&DocumentClass::xml(), content.as_bytes()).unwrap()
    }

    #[test]
    fn marks_up_tokens() {
        let mut ctx = xml_context("<doc>Hello world</doc>");
        let hello = ctx.put_open_tag(5, "w").unwrap();
        ctx.put_attribute(hello, "pos", "1").unwrap();
        ctx.put_close_tag(10, "w").unwrap();
        ctx.put_open_tag(11, "w").unwrap();
        ctx.put_close_tag(16, "w").unwrap();
        assert_eq!(
            ctx.render(),
            "<doc><w pos=\"1\">Hello</w> <w>world</w></doc>"
        );
    }

    #[test]
    fn close_sorts_before_open_at_same_position() {
        let mut ctx = xml_context("<doc>ab</doc>");
        ctx.put_open_tag(5, "t").unwrap();
        ctx.put_close_tag(6, "t").unwrap();
        ctx.put_open_tag(6, "t").unwrap();
        ctx.put_close_tag(7, "t").unwrap();
        assert_eq!(ctx.render(), "<doc><t>a</t><t>b</t></doc>");
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(matches!(
            MarkupContext::for_xml(&DocumentClass::xml(), b"<doc><a></doc>"),
            Err(Error::BadDocument(..))
        ));
    }
}
