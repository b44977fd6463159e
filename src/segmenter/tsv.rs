//! The TSV segmenter.
//!
//! The first line of the input names the columns. Every following line
//! emits one event per selected column with the raw cell as segment bytes.
//! Selector expressions are bare header names; the reserved name `lineno`
//! selects a synthetic field carrying the one-based data line number.
//! A sub-section definition covers each data row; its expression is
//! ignored because rows are the only sub-section granularity of the
//! format.
//!
//! Event positions are synthetic: `line_no * column_count + column_index`,
//! which keeps the stream monotone without tracking byte offsets through
//! the character set conversion.

use memchr::memchr;

use crate::docclass::DocumentClass;
use crate::errors::{Error, Result};
use crate::segmenter::{
    encoder_for_class, Fetch, SegmentEvent, SegmenterContext, SegmenterInstance,
};

/// Reserved pseudo-column name for the data line number.
pub const LINENO_FIELD: &str = "lineno";

/// Selector table of the TSV segmenter. Several ids may be bound to the
/// same column name; they fire in definition order.
#[derive(Clone, Debug, Default)]
struct TsvParserDefinition {
    selectors: Vec<(String, u32)>,
    start_id: Option<u32>,
    end_id: Option<u32>,
}

impl TsvParserDefinition {
    fn ids_for(&self, name: &str) -> impl Iterator<Item = u32> + '_ {
        let name = name.to_string();
        self.selectors
            .iter()
            .filter(move |(sel, _)| *sel == name)
            .map(|(_, id)| *id)
    }
}

/// The TSV segmenter.
#[derive(Clone, Debug, Default)]
pub struct TsvSegmenter {
    def: TsvParserDefinition,
}

impl TsvSegmenter {
    /// Creates a segmenter with no selectors defined.
    pub fn new() -> TsvSegmenter {
        TsvSegmenter::default()
    }
}

impl SegmenterInstance for TsvSegmenter {
    fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()> {
        let name = expression.trim();
        if name.is_empty() || name.contains(['/', '@', '(', ')', '[', ']']) {
            return Err(Error::InvalidArgument(format!(
                "TSV selector must be a plain column name, got '{}'",
                expression
            )));
        }
        self.def.selectors.push((name.to_string(), id));
        Ok(())
    }

    fn define_subsection(&mut self, start_id: u32, end_id: u32, _expression: &str) -> Result<()> {
        self.def.start_id = Some(start_id);
        self.def.end_id = Some(end_id);
        Ok(())
    }

    fn create_context<'a>(
        &'a self,
        class: &DocumentClass,
    ) -> Result<Box<dyn SegmenterContext + 'a>> {
        Ok(Box::new(TsvSegmenterContext {
            def: &self.def,
            encoder: encoder_for_class(class)?,
            buf: String::new(),
            consumed: 0,
            eof: false,
            headers: None,
            line_no: 0,
            queue: std::collections::VecDeque::new(),
            cur: None,
        }))
    }

    fn mime_type(&self) -> &'static str {
        crate::docclass::MIME_TSV
    }
}

/// One-document parsing context of the [`TsvSegmenter`].
pub struct TsvSegmenterContext<'a> {
    def: &'a TsvParserDefinition,
    encoder: crate::encoding::TextEncoder,
    buf: String,
    consumed: usize,
    eof: bool,
    headers: Option<Vec<String>>,
    line_no: u64,
    queue: std::collections::VecDeque<(u32, u64, Vec<u8>)>,
    cur: Option<(u32, u64, Vec<u8>)>,
}

impl TsvSegmenterContext<'_> {
    /// Takes the next complete line out of the buffer. With eof declared,
    /// a trailing line without newline counts as complete.
    fn take_line(&mut self) -> Option<String> {
        let rest = &self.buf.as_bytes()[self.consumed..];
        match memchr(b'\n', rest) {
            Some(idx) => {
                let line = self.buf[self.consumed..self.consumed + idx]
                    .trim_end_matches('\r')
                    .to_string();
                self.consumed += idx + 1;
                Some(line)
            }
            None if self.eof && !rest.is_empty() => {
                let line = self.buf[self.consumed..].trim_end_matches('\r').to_string();
                self.consumed = self.buf.len();
                Some(line)
            }
            None => None,
        }
    }

    /// Expands one data line into its queued events.
    fn queue_line(&mut self, line: &str) {
        let headers = self.headers.as_ref().expect("header line parsed first");
        let ncol = headers.len() as u64;
        self.line_no += 1;
        let base = self.line_no * ncol;
        if let Some(start_id) = self.def.start_id {
            self.queue.push_back((start_id, base, Vec::new()));
        }
        for id in self.def.ids_for(LINENO_FIELD) {
            self.queue
                .push_back((id, base, self.line_no.to_string().into_bytes()));
        }
        let cells: Vec<&str> = line.split('\t').collect();
        for (idx, header) in headers.iter().enumerate() {
            let cell = cells.get(idx).copied().unwrap_or("");
            for id in self.def.ids_for(header) {
                self.queue
                    .push_back((id, base + idx as u64, cell.as_bytes().to_vec()));
            }
        }
        if let Some(end_id) = self.def.end_id {
            self.queue.push_back((end_id, base + ncol, Vec::new()));
        }
    }
}

impl SegmenterContext for TsvSegmenterContext<'_> {
    fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        if self.eof {
            return Err(Error::OperationOrder(
                "input fed after declared end of input".to_string(),
            ));
        }
        let converted = self.encoder.convert(chunk, eof)?;
        if self.buf.is_empty() {
            self.buf
                .push_str(converted.strip_prefix('\u{feff}').unwrap_or(&converted));
        } else {
            self.buf.push_str(&converted);
        }
        self.eof = eof;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Fetch<'_>> {
        while self.queue.is_empty() {
            let line = match self.take_line() {
                Some(line) => line,
                None if self.eof => {
                    return Ok(Fetch::EndOfStream);
                }
                None => return Ok(Fetch::NeedMore),
            };
            if self.headers.is_none() {
                self.headers = Some(line.split('\t').map(str::to_string).collect());
            } else {
                self.queue_line(&line);
            }
        }
        self.cur = self.queue.pop_front();
        let cur = self.cur.as_ref().expect("queue was checked non-empty");
        Ok(Fetch::Event(SegmentEvent {
            id: cur.0,
            position: cur.1,
            bytes: &cur.2,
        }))
    }
}
