//! The XML segmenter: an incremental, resumable scanner that drives the
//! selection automaton with tag structure events.
//!
//! The scanner works on a growing UTF-8 buffer. When a token is cut off at
//! the end of the buffered input and the end of input has not been declared
//! yet, the scan position stays put and the context reports
//! [`Fetch::NeedMore`]; appending the next chunk makes the scan re-enter at
//! the same token. Character set conversion happens up front, so the
//! scanner itself only ever sees UTF-8.

use memchr::memchr;

use crate::docclass::DocumentClass;
use crate::encoding::{detect_bom, detect_charset, TextEncoder};
use crate::errors::{Error, Result};
use crate::escape::unescape;
use crate::markup::MarkupContext;
use crate::segmenter::{
    encoder_for_class, ElementType, Fetch, SegmentEvent, SegmenterContext, SegmenterInstance,
};
use crate::xpath::{XPathAutomaton, XPathContext};

/// One structural element produced by the scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RawEvent {
    pub kind: ElementType,
    pub value: Vec<u8>,
    pub pos: u64,
}

/// Outcome of one scanner step.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    Event(RawEvent),
    NeedMore,
    End,
}

/// Resumable pull scanner over buffered UTF-8 XML text.
#[derive(Debug, Default)]
pub(crate) struct XmlScanner {
    buf: String,
    at: usize,
    eof: bool,
    queue: std::collections::VecDeque<RawEvent>,
    tag_stack: Vec<String>,
}

impl XmlScanner {
    pub(crate) fn new() -> XmlScanner {
        XmlScanner::default()
    }

    pub(crate) fn append(&mut self, text: &str) {
        if self.buf.is_empty() && self.at == 0 {
            self.buf.push_str(text.strip_prefix('\u{feff}').unwrap_or(text));
        } else {
            self.buf.push_str(text);
        }
    }

    pub(crate) fn set_eof(&mut self) {
        self.eof = true;
    }

    fn err(&self, at: usize, msg: &str) -> Error {
        Error::BadDocument(at as u64, msg.to_string())
    }

    /// Scans the next structural element.
    pub(crate) fn next_event(&mut self) -> Result<Scan> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Scan::Event(event));
            }
            let bytes = self.buf.as_bytes();
            if self.at >= bytes.len() {
                if !self.eof {
                    return Ok(Scan::NeedMore);
                }
                if let Some(open) = self.tag_stack.last() {
                    return Err(self.err(self.at, &format!("tag '{}' is not closed", open)));
                }
                return Ok(Scan::End);
            }
            if bytes[self.at] != b'<' {
                let start = self.at;
                let end = match memchr(b'<', &bytes[start..]) {
                    Some(i) => start + i,
                    None if self.eof => bytes.len(),
                    None => return Ok(Scan::NeedMore),
                };
                let text = &self.buf[start..end];
                self.at = end;
                if !text.chars().all(char::is_whitespace) {
                    let value = unescape(text).into_owned().into_bytes();
                    self.queue.push_back(RawEvent {
                        kind: ElementType::Content,
                        value,
                        pos: start as u64,
                    });
                }
                continue;
            }
            // a markup token begins at `at`
            match bytes.get(self.at + 1) {
                None => {
                    if self.eof {
                        return Err(self.err(self.at, "unexpected end of document in tag"));
                    }
                    return Ok(Scan::NeedMore);
                }
                Some(b'?') => {
                    match find_subslice(&bytes[self.at..], b"?>") {
                        Some(end) => self.at += end + 2,
                        None if self.eof => {
                            return Err(self.err(self.at, "processing instruction not closed"))
                        }
                        None => return Ok(Scan::NeedMore),
                    }
                }
                Some(b'!') => {
                    if !self.scan_bang()? {
                        return Ok(Scan::NeedMore);
                    }
                }
                Some(b'/') => {
                    let gt = match memchr(b'>', &bytes[self.at..]) {
                        Some(i) => self.at + i,
                        None if self.eof => return Err(self.err(self.at, "close tag not closed")),
                        None => return Ok(Scan::NeedMore),
                    };
                    let name = self.buf[self.at + 2..gt].trim().to_string();
                    let pos = self.at as u64;
                    self.at = gt + 1;
                    match self.tag_stack.pop() {
                        Some(open) if open == name || name.is_empty() => {}
                        Some(open) => {
                            return Err(self.err(pos as usize, &format!(
                                "expected </{}>, found </{}>",
                                open, name
                            )))
                        }
                        None => {
                            return Err(self.err(pos as usize, "close tag without open tag"));
                        }
                    }
                    self.queue.push_back(RawEvent {
                        kind: ElementType::CloseTag,
                        value: name.into_bytes(),
                        pos,
                    });
                }
                Some(_) => {
                    if !self.scan_start_tag()? {
                        return Ok(Scan::NeedMore);
                    }
                }
            }
        }
    }

    /// Skips `<!--`, `<!DOCTYPE` and queues `<![CDATA[` content. Returns
    /// false when more input is needed.
    fn scan_bang(&mut self) -> Result<bool> {
        let bytes = self.buf.as_bytes();
        let rest = &bytes[self.at..];
        if rest.len() < 9 && !self.eof && !rest.starts_with(b"<!--") {
            // not enough bytes to tell comment, CDATA and DOCTYPE apart
            if b"<!--".starts_with(&rest[..rest.len().min(4)])
                || b"<![CDATA[".starts_with(&rest[..rest.len().min(9)])
                || b"<!DOCTYPE".starts_with(&rest[..rest.len().min(9)])
            {
                return Ok(false);
            }
        }
        if rest.starts_with(b"<!--") {
            match find_subslice(rest, b"-->") {
                Some(end) => {
                    self.at += end + 3;
                    Ok(true)
                }
                None if self.eof => Err(self.err(self.at, "comment not closed")),
                None => Ok(false),
            }
        } else if rest.starts_with(b"<![CDATA[") {
            match find_subslice(rest, b"]]>") {
                Some(end) => {
                    let value = rest[9..end].to_vec();
                    let pos = (self.at + 9) as u64;
                    self.at += end + 3;
                    if !value.is_empty() {
                        self.queue.push_back(RawEvent {
                            kind: ElementType::Content,
                            value,
                            pos,
                        });
                    }
                    Ok(true)
                }
                None if self.eof => Err(self.err(self.at, "CDATA section not closed")),
                None => Ok(false),
            }
        } else if rest.len() >= 9 && rest[..9].eq_ignore_ascii_case(b"<!DOCTYPE") {
            // skip the doctype, honoring a bracketed subset
            let mut depth = 0i32;
            for (idx, &byte) in rest.iter().enumerate() {
                match byte {
                    b'[' => depth += 1,
                    b']' => depth -= 1,
                    b'>' if depth == 0 => {
                        self.at += idx + 1;
                        return Ok(true);
                    }
                    _ => {}
                }
            }
            if self.eof {
                Err(self.err(self.at, "DOCTYPE not closed"))
            } else {
                Ok(false)
            }
        } else if self.eof {
            Err(self.err(self.at, "invalid markup after '<!'"))
        } else {
            Ok(false)
        }
    }

    /// Parses a start or empty tag and queues its events. Returns false
    /// when the tag is cut off and more input is needed.
    fn scan_start_tag(&mut self) -> Result<bool> {
        let bytes = self.buf.as_bytes();
        let start = self.at;
        // find the closing '>' outside of quoted attribute values
        let mut quote = 0u8;
        let mut gt = None;
        for (idx, &byte) in bytes[start..].iter().enumerate() {
            match byte {
                b'"' | b'\'' => {
                    if quote == 0 {
                        quote = byte;
                    } else if quote == byte {
                        quote = 0;
                    }
                }
                b'>' if quote == 0 => {
                    gt = Some(start + idx);
                    break;
                }
                _ => {}
            }
        }
        let gt = match gt {
            Some(i) => i,
            None if self.eof => return Err(self.err(start, "tag not closed")),
            None => return Ok(false),
        };
        let empty = bytes[gt - 1] == b'/';
        let inner_end = if empty { gt - 1 } else { gt };
        let inner = &self.buf[start + 1..inner_end];

        let name_len = inner
            .as_bytes()
            .iter()
            .position(|&b| b <= 32 || b == b'/')
            .unwrap_or(inner.len());
        let name = inner[..name_len].to_string();
        if name.is_empty() {
            return Err(self.err(start, "tag name expected"));
        }
        self.queue.push_back(RawEvent {
            kind: ElementType::OpenTag,
            value: name.as_bytes().to_vec(),
            pos: start as u64,
        });
        let attrs_rest = inner[name_len..].to_string();
        self.scan_attributes(&attrs_rest, start + 1 + name_len)?;
        if empty {
            self.queue.push_back(RawEvent {
                kind: ElementType::CloseTag,
                value: name.as_bytes().to_vec(),
                pos: gt as u64,
            });
        } else {
            self.tag_stack.push(name.to_string());
        }
        self.at = gt + 1;
        Ok(true)
    }

    /// Parses `name="value"` attributes from the inside of a tag and
    /// queues name/value event pairs. `base` is the byte position of the
    /// attribute text in the document.
    fn scan_attributes(&mut self, mut attrs: &str, mut base: usize) -> Result<()> {
        loop {
            let skipped = attrs.len() - attrs.trim_start().len();
            attrs = &attrs[skipped..];
            base += skipped;
            if attrs.is_empty() {
                return Ok(());
            }
            let eq = match attrs.find('=') {
                Some(i) => i,
                None => return Err(self.err(base, "'=' expected after attribute name")),
            };
            let name = attrs[..eq].trim_end();
            if name.is_empty() {
                return Err(self.err(base, "attribute name expected"));
            }
            let value_at = eq + 1 + attrs[eq + 1..].len() - attrs[eq + 1..].trim_start().len();
            let quote = match attrs.as_bytes().get(value_at) {
                Some(q @ (b'"' | b'\'')) => *q,
                _ => return Err(self.err(base + value_at, "attribute value must be quoted")),
            };
            let value_start = value_at + 1;
            let end = match attrs[value_start..].find(quote as char) {
                Some(i) => value_start + i,
                None => return Err(self.err(base + value_at, "attribute value not terminated")),
            };
            let value = unescape(&attrs[value_start..end]).into_owned();
            self.queue.push_back(RawEvent {
                kind: ElementType::TagAttribName,
                value: name.as_bytes().to_vec(),
                pos: (base) as u64,
            });
            self.queue.push_back(RawEvent {
                kind: ElementType::TagAttribValue,
                value: value.into_bytes(),
                pos: (base + value_start) as u64,
            });
            attrs = &attrs[end + 1..];
            base += end + 1;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// The XML segmenter. Holds the compiled selection automaton shared by all
/// of its contexts.
#[derive(Debug, Default)]
pub struct XmlSegmenter {
    automaton: XPathAutomaton,
}

impl XmlSegmenter {
    /// Creates a segmenter with no selectors defined.
    pub fn new() -> XmlSegmenter {
        XmlSegmenter::default()
    }
}

impl SegmenterInstance for XmlSegmenter {
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
        Ok(Box::new(XmlSegmenterContext::new(&self.automaton, class)?))
    }

    fn create_markup_context(
        &self,
        class: &DocumentClass,
        content: &[u8],
    ) -> Result<MarkupContext> {
        MarkupContext::for_xml(class, content)
    }

    fn mime_type(&self) -> &'static str {
        crate::docclass::MIME_XML
    }
}

enum Decode {
    /// Encoding not yet known; raw bytes are buffered until it can be
    /// decided from a BOM or zero-byte strides
    Undecided(Vec<u8>),
    /// Encoding decided, conversion (or validating pass-through) active
    Convert(TextEncoder),
}

/// One-document parsing context of the [`XmlSegmenter`].
pub struct XmlSegmenterContext<'a> {
    select: XPathContext<'a>,
    scanner: XmlScanner,
    decode: Decode,
    eof: bool,
    cur: Option<RawEvent>,
}

impl<'a> XmlSegmenterContext<'a> {
    fn new(automaton: &'a XPathAutomaton, class: &DocumentClass) -> Result<XmlSegmenterContext<'a>> {
        let decode = if class.encoding.is_some() {
            Decode::Convert(encoder_for_class(class)?)
        } else {
            Decode::Undecided(Vec::new())
        };
        Ok(XmlSegmenterContext {
            select: automaton.create_context(),
            scanner: XmlScanner::new(),
            decode,
            eof: false,
            cur: None,
        })
    }

    fn decide_encoding(raw: &mut Vec<u8>) -> Result<TextEncoder> {
        match detect_bom(raw) {
            Some((name, bom_len)) => {
                raw.drain(..bom_len);
                TextEncoder::for_name(name)
            }
            None => TextEncoder::for_name(detect_charset(raw).unwrap_or("utf-8")),
        }
    }

    fn feed(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        match &mut self.decode {
            Decode::Undecided(raw) => {
                raw.extend_from_slice(chunk);
                if raw.len() >= 4 || eof {
                    let mut raw = std::mem::take(raw);
                    let mut encoder = Self::decide_encoding(&mut raw)?;
                    self.scanner.append(&encoder.convert(&raw, eof)?);
                    self.decode = Decode::Convert(encoder);
                }
                Ok(())
            }
            Decode::Convert(encoder) => {
                let text = encoder.convert(chunk, eof)?;
                self.scanner.append(&text);
                Ok(())
            }
        }
    }
}

impl SegmenterContext for XmlSegmenterContext<'_> {
    fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        if self.eof {
            return Err(Error::OperationOrder(
                "input fed after declared end of input".to_string(),
            ));
        }
        self.feed(chunk, eof)?;
        if eof {
            self.eof = true;
            self.scanner.set_eof();
        }
        Ok(())
    }

    fn get_next(&mut self) -> Result<Fetch<'_>> {
        loop {
            if let Some(id) = self.select.next_match() {
                let cur = self.cur.as_ref().expect("match without a current element");
                return Ok(Fetch::Event(SegmentEvent {
                    id,
                    position: cur.pos,
                    bytes: &cur.value,
                }));
            }
            match self.scanner.next_event()? {
                Scan::Event(event) => {
                    self.select.put_element(event.kind, &event.value);
                    self.cur = Some(event);
                }
                Scan::NeedMore => return Ok(Fetch::NeedMore),
                Scan::End => {
                    self.select.put_element(ElementType::Exit, b"");
                    return Ok(Fetch::EndOfStream);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan_all(xml: &str) -> Vec<(ElementType, String, u64)> {
        let mut scanner = XmlScanner::new();
        scanner.append(xml);
        scanner.set_eof();
        let mut out = Vec::new();
        loop {
            match scanner.next_event().unwrap() {
                Scan::Event(ev) => out.push((
                    ev.kind,
                    String::from_utf8(ev.value).unwrap(),
                    ev.pos,
                )),
                Scan::End => return out,
                Scan::NeedMore => panic!("NeedMore with eof set"),
            }
        }
    }

    #[test]
    fn scans_simple_document() {
        let events = scan_all("<doc><title>Hello</title></doc>");
        assert_eq!(
            events,
            vec![
                (ElementType::OpenTag, "doc".to_string(), 0),
                (ElementType::OpenTag, "title".to_string(), 5),
                (ElementType::Content, "Hello".to_string(), 12),
                (ElementType::CloseTag, "title".to_string(), 17),
                (ElementType::CloseTag, "doc".to_string(), 25),
            ]
        );
    }

    #[test]
    fn scans_attributes_and_empty_tags() {
        let events = scan_all(r#"<doc><link href="/x" rel='next'/></doc>"#);
        assert_eq!(
            events,
            vec![
                (ElementType::OpenTag, "doc".to_string(), 0),
                (ElementType::OpenTag, "link".to_string(), 5),
                (ElementType::TagAttribName, "href".to_string(), 11),
                (ElementType::TagAttribValue, "/x".to_string(), 17),
                (ElementType::TagAttribName, "rel".to_string(), 21),
                (ElementType::TagAttribValue, "next".to_string(), 26),
                (ElementType::CloseTag, "link".to_string(), 32),
                (ElementType::CloseTag, "doc".to_string(), 33),
            ]
        );
    }

    #[test]
    fn skips_prolog_comment_and_doctype() {
        let events = scan_all(
            "<?xml version=\"1.0\"?><!DOCTYPE doc><!-- note --><doc>x</doc>",
        );
        assert_eq!(events[0].0, ElementType::OpenTag);
        assert_eq!(events[1], (ElementType::Content, "x".to_string(), 53));
    }

    #[test]
    fn cdata_is_content() {
        let events = scan_all("<doc><![CDATA[a < b]]></doc>");
        assert_eq!(events[1], (ElementType::Content, "a < b".to_string(), 14));
    }

    #[test]
    fn content_is_unescaped() {
        let events = scan_all("<doc>a &lt; b</doc>");
        assert_eq!(events[1].1, "a < b");
    }

    #[test]
    fn resumes_after_chunk_boundary() {
        let mut scanner = XmlScanner::new();
        scanner.append("<doc><ti");
        assert_eq!(scanner.next_event().unwrap(), Scan::Event(RawEvent {
            kind: ElementType::OpenTag,
            value: b"doc".to_vec(),
            pos: 0,
        }));
        assert_eq!(scanner.next_event().unwrap(), Scan::NeedMore);
        scanner.append("tle>x</title></doc>");
        scanner.set_eof();
        assert_eq!(scanner.next_event().unwrap(), Scan::Event(RawEvent {
            kind: ElementType::OpenTag,
            value: b"title".to_vec(),
            pos: 5,
        }));
    }

    #[test]
    fn unbalanced_document_fails() {
        let mut scanner = XmlScanner::new();
        scanner.append("<doc><a>x</doc>");
        scanner.set_eof();
        let mut result = scanner.next_event();
        while let Ok(Scan::Event(_)) = result {
            result = scanner.next_event();
        }
        assert!(matches!(result, Err(Error::BadDocument(..))));
    }
}
