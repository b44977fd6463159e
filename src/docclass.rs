//! Document classes and content type detection.
//!
//! A [`DocumentClass`] names the mime type, character set encoding and an
//! optional schema of an input document. [`DocumentClass::detect`] inspects
//! a leading byte window of a document and decides all three, the way the
//! standard detector of the original analyzer toolchain does.

use serde::{Deserialize, Serialize};

use crate::encoding::{detect_bom, detect_charset};

/// Mime type of XML documents
pub const MIME_XML: &str = "application/xml";
/// Mime type of JSON documents
pub const MIME_JSON: &str = "application/json";
/// Mime type of tab-separated-values documents
pub const MIME_TSV: &str = "text/tab-separated-values";
/// Mime type of plain text documents
pub const MIME_PLAIN: &str = "text/plain";

/// Classification of one input document: mime type, character set encoding
/// and an optional schema identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentClass {
    /// Mime type of the document content
    pub mime_type: String,
    /// Character set encoding; `None` means UTF-8 is assumed
    pub encoding: Option<String>,
    /// Schema identifier, if the document declares one
    pub schema: Option<String>,
}

impl DocumentClass {
    /// Creates a document class for the given mime type, leaving encoding
    /// and schema undeclared.
    pub fn new(mime_type: impl Into<String>) -> DocumentClass {
        DocumentClass {
            mime_type: mime_type.into(),
            encoding: None,
            schema: None,
        }
    }

    /// Document class for XML content.
    pub fn xml() -> DocumentClass {
        DocumentClass::new(MIME_XML)
    }

    /// Document class for JSON content.
    pub fn json() -> DocumentClass {
        DocumentClass::new(MIME_JSON)
    }

    /// Document class for tab-separated-values content.
    pub fn tsv() -> DocumentClass {
        DocumentClass::new(MIME_TSV)
    }

    /// Document class for plain text content.
    pub fn plain() -> DocumentClass {
        DocumentClass::new(MIME_PLAIN)
    }

    /// Sets the character set encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> DocumentClass {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sets the schema identifier.
    pub fn with_schema(mut self, schema: impl Into<String>) -> DocumentClass {
        self.schema = Some(schema.into());
        self
    }

    /// Inspects the leading bytes of a document and decides mime type and
    /// encoding. The rules are evaluated in order: JSON, XML, TSV, plain
    /// text. Returns `None` for anything that looks binary.
    pub fn detect(window: &[u8]) -> Option<DocumentClass> {
        let (bom_encoding, bom_len) = match detect_bom(window) {
            Some((name, len)) => (Some(name), len),
            None => (None, 0),
        };
        let body = &window[bom_len..];

        if is_json(body) {
            let encoding = bom_encoding
                .map(str::to_string)
                .or_else(|| detect_charset(body).map(str::to_string));
            return Some(DocumentClass {
                mime_type: MIME_JSON.to_string(),
                encoding,
                schema: None,
            });
        }
        if let Some(declared) = check_xml(body) {
            let encoding = declared
                .or_else(|| bom_encoding.map(str::to_string))
                .or_else(|| detect_charset(body).map(str::to_string));
            return Some(DocumentClass {
                mime_type: MIME_XML.to_string(),
                encoding,
                schema: None,
            });
        }
        if is_tsv(body) {
            return Some(DocumentClass {
                mime_type: MIME_TSV.to_string(),
                encoding: bom_encoding.map(str::to_string),
                schema: None,
            });
        }
        if is_text(body) {
            return Some(DocumentClass {
                mime_type: MIME_PLAIN.to_string(),
                encoding: bom_encoding.map(str::to_string),
                schema: None,
            });
        }
        None
    }
}

fn skip_spaces(bytes: &[u8], mut at: usize) -> usize {
    while at < bytes.len() && bytes[at] <= 32 {
        at += 1;
    }
    at
}

/// JSON probe: `{`, a double quoted key, `:` and a value start token.
fn is_json(bytes: &[u8]) -> bool {
    const VALUE_START: &[u8] = b"[]{}E-+0123456789.'\"";
    let mut at = 0;
    if bytes.get(at) != Some(&b'{') {
        return false;
    }
    at = skip_spaces(bytes, at + 1);
    if bytes.get(at) != Some(&b'"') {
        return false;
    }
    at += 1;
    while at < bytes.len() && bytes[at] != b'"' {
        at += 1;
    }
    if at >= bytes.len() {
        return false;
    }
    at = skip_spaces(bytes, at + 1);
    if bytes.get(at) != Some(&b':') {
        return false;
    }
    at = skip_spaces(bytes, at + 1);
    matches!(bytes.get(at), Some(b) if VALUE_START.contains(b))
}

/// XML probe. Returns `Some(declared_encoding)` when the window starts an
/// XML document; the inner option is the encoding of the XML declaration.
/// Zero bytes are skipped so that 16/32 bit unit encodings probe the same.
fn check_xml(bytes: &[u8]) -> Option<Option<String>> {
    enum State {
        Start,
        Header0,
        Header,
        Tag,
    }
    let mut state = State::Start;
    let mut hdr = Vec::new();
    for &byte in bytes {
        if byte == 0 {
            continue;
        }
        match state {
            State::Start => {
                if byte == b'<' {
                    state = State::Header0;
                } else {
                    return None;
                }
            }
            State::Header0 => {
                state = if byte == b'?' { State::Header } else { State::Tag };
            }
            State::Header => {
                if byte == b'<' {
                    return None;
                }
                if byte == b'>' {
                    return Some(declared_encoding(&hdr));
                }
                if byte > 32 {
                    hdr.push(byte.to_ascii_lowercase());
                }
            }
            State::Tag => {
                if byte == b'<' {
                    return None;
                }
                if byte == b'>' {
                    return Some(None);
                }
            }
        }
    }
    None
}

/// Extracts `encoding="..."` from a lowercased, whitespace-stripped XML
/// declaration.
fn declared_encoding(hdr: &[u8]) -> Option<String> {
    let key = b"encoding=";
    let at = hdr.windows(key.len()).position(|w| w == key)? + key.len();
    let quote = *hdr.get(at)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let rest = &hdr[at + 1..];
    let end = rest.iter().position(|&b| b == quote)?;
    String::from_utf8(rest[..end].to_vec()).ok()
}

/// TSV probe: the first two newline-terminated lines share one tab count.
fn is_tsv(bytes: &[u8]) -> bool {
    let mut seps = [0u32; 2];
    let mut nof_seps = 0u32;
    let mut nof_lines = 0usize;
    for &byte in bytes {
        match byte {
            b'\n' => {
                seps[nof_lines] = nof_seps;
                nof_lines += 1;
                nof_seps = 0;
                if nof_lines >= 2 {
                    break;
                }
            }
            b'\t' => nof_seps += 1,
            _ => {}
        }
    }
    nof_lines >= 2 && seps[0] > 0 && seps[0] == seps[1]
}

/// Plain text probe: no control bytes besides tab, newline, carriage
/// return and NUL in the first KiB.
fn is_text(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(1024)
        .all(|&b| b == 0 || b >= 32 || matches!(b, b'\t' | b'\n' | b'\r'))
}
