//! The segmenter contract: turning bytes of a specific document format
//! into a uniform stream of selected segments.
//!
//! A [`SegmenterInstance`] holds the compiled selector expressions of one
//! analyzer configuration. A [`SegmenterContext`] is the one-shot parser of
//! one document: the driver pumps bytes in with [`put_input`] and pulls
//! `(id, position, bytes)` events out with [`get_next`] until
//! [`Fetch::EndOfStream`]. When a chunk is exhausted and the end of input
//! has not been declared, [`get_next`] yields [`Fetch::NeedMore`] instead
//! of blocking; the driver appends the next chunk and re-enters.
//!
//! [`put_input`]: SegmenterContext::put_input
//! [`get_next`]: SegmenterContext::get_next

pub mod json;
pub mod plain;
pub mod tsv;
pub mod xml;

use crate::docclass::{DocumentClass, MIME_JSON, MIME_PLAIN, MIME_TSV, MIME_XML};
use crate::errors::{Error, Result};
use crate::markup::MarkupContext;

/// Type of a structural element event fed into the selection automaton.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    /// A tag was opened; the value is the tag name
    OpenTag,
    /// A tag was closed
    CloseTag,
    /// An attribute name inside an open tag
    TagAttribName,
    /// The value belonging to the last attribute name
    TagAttribValue,
    /// Text content of the enclosing tag
    Content,
    /// End of the document
    Exit,
}

/// A selected segment: the id of the matched selector expression, the byte
/// position of the segment in the source and the segment bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentEvent<'b> {
    /// Id the matching expression was defined with
    pub id: u32,
    /// Byte position in the source, non-decreasing over the stream
    pub position: u64,
    /// The bytes of the selected segment
    pub bytes: &'b [u8],
}

/// Outcome of one [`SegmenterContext::get_next`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fetch<'b> {
    /// The next selected segment
    Event(SegmentEvent<'b>),
    /// The current chunk is exhausted and the end of input has not been
    /// declared yet; feed more bytes and call again
    NeedMore,
    /// All events of the document have been delivered
    EndOfStream,
}

/// A configured segmenter for one document format. Immutable once the
/// first context has been created; safe to share between threads.
pub trait SegmenterInstance: Send + Sync {
    /// Compiles `expression` and binds its matches to `id`.
    fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()>;

    /// Registers a sub-section of the document: `start_id` fires on entry,
    /// `end_id` on exit of the selected tag scope.
    fn define_subsection(&mut self, start_id: u32, end_id: u32, expression: &str) -> Result<()>;

    /// Creates the one-shot parser for one document of the given class.
    fn create_context<'a>(&'a self, class: &DocumentClass)
        -> Result<Box<dyn SegmenterContext + 'a>>;

    /// Creates a document markup context for mutation mode. Only the XML
    /// segmenter implements this; every other variant fails with
    /// [`Error::NotImplemented`].
    fn create_markup_context(
        &self,
        _class: &DocumentClass,
        _content: &[u8],
    ) -> Result<MarkupContext> {
        Err(Error::NotImplemented(format!(
            "document markup not implemented for '{}' segmenter",
            self.mime_type()
        )))
    }

    /// The mime type this segmenter parses.
    fn mime_type(&self) -> &'static str;
}

/// The one-shot parser of one document, owned by a single driver.
pub trait SegmenterContext {
    /// Appends the next chunk of the document. Calling this again after a
    /// call with `eof == true` is an [`Error::OperationOrder`].
    fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()>;

    /// Fetches the next selected segment. Byte positions of consecutive
    /// events are non-decreasing; events with equal position preserve the
    /// compile order of their expressions.
    fn get_next(&mut self) -> Result<Fetch<'_>>;
}

/// Creates the segmenter for a mime type. This is the factory used for the
/// main document format of an analyzer as well as for nested sub-content
/// segmenters instantiated at configuration time.
pub fn create_segmenter(mime_type: &str) -> Result<Box<dyn SegmenterInstance>> {
    match mime_type {
        MIME_XML | "text/xml" => Ok(Box::new(xml::XmlSegmenter::new())),
        MIME_JSON => Ok(Box::new(json::JsonSegmenter::new())),
        MIME_TSV => Ok(Box::new(tsv::TsvSegmenter::new())),
        MIME_PLAIN => Ok(Box::new(plain::PlainSegmenter::new())),
        other => Err(Error::UnknownIdentifier(format!(
            "no segmenter defined for mime type '{}'",
            other
        ))),
    }
}

/// Creates the text encoder for a document class. Without a declared
/// encoding the UTF-8 encoder is used, which doubles as a validating
/// pass-through that is safe against chunk boundaries splitting a code
/// point.
pub(crate) fn encoder_for_class(class: &DocumentClass) -> Result<crate::encoding::TextEncoder> {
    match class.encoding.as_deref() {
        None => Ok(crate::encoding::TextEncoder::utf8()),
        Some(name) => crate::encoding::TextEncoder::for_name(name),
    }
}
