//! The plain text segmenter.
//!
//! Plain text has no structure to select from: the whole content is one
//! segment, emitted once per registered selector id when the end of input
//! has been declared. Selector expressions must be empty; anything else is
//! rejected, because a path cannot address into unstructured text.

use crate::docclass::DocumentClass;
use crate::errors::{Error, Result};
use crate::segmenter::{
    encoder_for_class, Fetch, SegmentEvent, SegmenterContext, SegmenterInstance,
};

/// The plain text segmenter.
#[derive(Clone, Debug, Default)]
pub struct PlainSegmenter {
    ids: Vec<u32>,
}

impl PlainSegmenter {
    /// Creates a segmenter with no selectors defined.
    pub fn new() -> PlainSegmenter {
        PlainSegmenter::default()
    }
}

impl SegmenterInstance for PlainSegmenter {
    fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()> {
        if !expression.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "plain text selector must be empty, got '{}'",
                expression
            )));
        }
        self.ids.push(id);
        Ok(())
    }

    fn define_subsection(&mut self, _start_id: u32, _end_id: u32, _expression: &str) -> Result<()> {
        Err(Error::NotImplemented(
            "sub sections are not supported by the plain text segmenter".to_string(),
        ))
    }

    fn create_context<'a>(
        &'a self,
        class: &DocumentClass,
    ) -> Result<Box<dyn SegmenterContext + 'a>> {
        Ok(Box::new(PlainSegmenterContext {
            ids: &self.ids,
            encoder: encoder_for_class(class)?,
            content: String::new(),
            eof: false,
            at: 0,
        }))
    }

    fn mime_type(&self) -> &'static str {
        crate::docclass::MIME_PLAIN
    }
}

/// One-document context of the [`PlainSegmenter`].
pub struct PlainSegmenterContext<'a> {
    ids: &'a [u32],
    encoder: crate::encoding::TextEncoder,
    content: String,
    eof: bool,
    at: usize,
}

impl SegmenterContext for PlainSegmenterContext<'_> {
    fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        if self.eof {
            return Err(Error::OperationOrder(
                "input fed after declared end of input".to_string(),
            ));
        }
        self.content.push_str(&self.encoder.convert(chunk, eof)?);
        self.eof = eof;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Fetch<'_>> {
        if !self.eof {
            return Ok(Fetch::NeedMore);
        }
        match self.ids.get(self.at) {
            Some(&id) => {
                self.at += 1;
                Ok(Fetch::Event(SegmentEvent {
                    id,
                    position: 0,
                    bytes: self.content.as_bytes(),
                }))
            }
            None => Ok(Fetch::EndOfStream),
        }
    }
}
