//! Conversion of character set encodings to UTF-8 and encoding detection.
//!
//! A [`TextEncoder`] converts a chunked byte stream in one of the supported
//! encodings into UTF-8, buffering incomplete code units across chunks. The
//! free functions [`detect_bom`] and [`detect_charset`] classify a leading
//! byte window of a document.

use encoding_rs::{
    Encoding, ISO_8859_2, ISO_8859_3, ISO_8859_4, ISO_8859_5, ISO_8859_6, ISO_8859_7, ISO_8859_8,
    UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252, WINDOWS_1254,
};

use crate::errors::{Error, Result};

/// Unicode "byte order mark" encoded as UTF-8
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// Unicode "byte order mark" encoded as UTF-16 with little-endian byte order
pub(crate) const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
/// Unicode "byte order mark" encoded as UTF-16 with big-endian byte order
pub(crate) const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];
/// Unicode "byte order mark" encoded as UTF-32 with big-endian byte order
pub(crate) const UTF32_BE_BOM: &[u8] = &[0x00, 0x00, 0xFE, 0xFF];
/// Unicode "byte order mark" encoded as UTF-32 with little-endian byte order
pub(crate) const UTF32_LE_BOM: &[u8] = &[0xFF, 0xFE, 0x00, 0x00];

/// Detects a byte order mark in the given byte window.
///
/// Returns the canonical name of the encoding the mark identifies together
/// with the length of the mark in bytes, or `None` when the window carries
/// no mark. Windows shorter than four bytes are never classified because
/// the UTF-16LE and UTF-32LE marks share a prefix.
pub fn detect_bom(bytes: &[u8]) -> Option<(&'static str, usize)> {
    if bytes.len() < 4 {
        return None;
    }
    if bytes.starts_with(UTF8_BOM) {
        return Some(("utf-8", 3));
    }
    if bytes.starts_with(UTF32_BE_BOM) {
        return Some(("utf-32be", 4));
    }
    if bytes.starts_with(UTF32_LE_BOM) {
        return Some(("utf-32le", 4));
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        return Some(("utf-16be", 2));
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        return Some(("utf-16le", 2));
    }
    None
}

/// Guesses the character set of a byte window without a byte order mark by
/// measuring where zero bytes fall modulo the code unit width.
///
/// ASCII-heavy text encoded in a 16 or 32 bit unit encoding has its zero
/// bytes on fixed strides; the modulo-4 counters disambiguate the unit
/// width and byte order. Windows without any zero byte are classified as
/// UTF-8. Returns `None` when the distribution fits no supported encoding.
pub fn detect_charset(bytes: &[u8]) -> Option<&'static str> {
    let window = &bytes[..bytes.len().min(1024)];
    let mut zcnt = 0u32;
    let mut max_zcnt = 0u32;
    let mut mcnt = [0u32; 4];
    for (cidx, &byte) in window.iter().enumerate() {
        if byte == 0x00 {
            zcnt += 1;
            mcnt[cidx % 4] += 1;
        } else if max_zcnt < zcnt {
            max_zcnt = zcnt;
            zcnt = 0;
        }
    }
    if max_zcnt == 0 {
        return Some("utf-8");
    }
    if mcnt[0] >= mcnt[1] && mcnt[1] >= mcnt[2] && mcnt[2] >= mcnt[3] && mcnt[3] == 0 {
        return Some("utf-32be");
    }
    if mcnt[0] == 0 && mcnt[0] <= mcnt[1] && mcnt[1] <= mcnt[2] && mcnt[2] <= mcnt[3] {
        return Some("utf-32le");
    }
    if mcnt[0] >= mcnt[1] && mcnt[2] >= mcnt[3] && mcnt[1] == 0 && mcnt[3] == 0 {
        return Some("utf-16be");
    }
    if mcnt[0] == 0 && mcnt[2] == 0 && mcnt[0] <= mcnt[1] && mcnt[2] <= mcnt[3] {
        return Some("utf-16le");
    }
    None
}

/// Normalizes an encoding name for lookup: lowercased with separators
/// removed, so that `UTF-16 BE`, `utf16be` and `UTF_16BE` are the same name.
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WideOrder {
    BigEndian,
    LittleEndian,
}

/// The decoder backend. Everything `encoding_rs` covers is delegated to it;
/// the four byte unit encodings are decoded by hand because `encoding_rs`
/// implements the WHATWG set only.
enum Backend {
    Rs(encoding_rs::Decoder),
    Utf32(WideOrder),
}

/// Streaming converter of a supported character set to UTF-8.
///
/// [`convert`] may be called repeatedly with consecutive chunks of the
/// input; a trailing incomplete code unit is buffered and prepended to the
/// next chunk. The converter is a one-document object: create one per
/// input stream.
///
/// [`convert`]: Self::convert
pub struct TextEncoder {
    backend: Backend,
    /// Carry buffer for a trailing incomplete UTF-32 unit
    carry: Vec<u8>,
    name: &'static str,
}

impl TextEncoder {
    /// Creates an encoder for the encoding with the given name.
    ///
    /// Supported: UTF-8, UTF-16BE/LE, UTF-32BE/LE, UCS-2BE/LE (treated as
    /// UTF-16), UCS-4BE/LE (treated as UTF-32) and ISO-8859-1 to -9.
    /// Anything else fails with [`Error::UnsupportedEncoding`].
    pub fn for_name(name: &str) -> Result<TextEncoder> {
        let normalized = normalize_name(name);
        let (backend, canonical): (Backend, &'static str) = match normalized.as_str() {
            "" | "utf8" => (Backend::Rs(UTF_8.new_decoder()), "utf-8"),
            "utf16" | "utf16be" | "ucs2" | "ucs2be" => {
                (Backend::Rs(UTF_16BE.new_decoder()), "utf-16be")
            }
            "utf16le" | "ucs2le" => (Backend::Rs(UTF_16LE.new_decoder()), "utf-16le"),
            "utf32" | "utf32be" | "ucs4" | "ucs4be" => {
                (Backend::Utf32(WideOrder::BigEndian), "utf-32be")
            }
            "utf32le" | "ucs4le" => (Backend::Utf32(WideOrder::LittleEndian), "utf-32le"),
            other => match Self::iso_8859(other) {
                Some((encoding, canonical)) => (Backend::Rs(encoding.new_decoder()), canonical),
                None => return Err(Error::UnsupportedEncoding(name.to_string())),
            },
        };
        Ok(TextEncoder {
            backend,
            carry: Vec::new(),
            name: canonical,
        })
    }

    /// Creates a pass-through encoder for UTF-8 input.
    pub fn utf8() -> TextEncoder {
        TextEncoder {
            backend: Backend::Rs(UTF_8.new_decoder()),
            carry: Vec::new(),
            name: "utf-8",
        }
    }

    fn iso_8859(normalized: &str) -> Option<(&'static Encoding, &'static str)> {
        let codepage = if let Some(rest) = normalized.strip_prefix("iso8859") {
            rest
        } else if let Some(rest) = normalized.strip_prefix("isolatin") {
            rest
        } else {
            return None;
        };
        // ISO-8859-1 and -9 are decoded with their Windows supersets, the
        // way the WHATWG encoding standard maps them.
        match codepage {
            "1" => Some((WINDOWS_1252, "iso-8859-1")),
            "2" => Some((ISO_8859_2, "iso-8859-2")),
            "3" => Some((ISO_8859_3, "iso-8859-3")),
            "4" => Some((ISO_8859_4, "iso-8859-4")),
            "5" => Some((ISO_8859_5, "iso-8859-5")),
            "6" => Some((ISO_8859_6, "iso-8859-6")),
            "7" => Some((ISO_8859_7, "iso-8859-7")),
            "8" => Some((ISO_8859_8, "iso-8859-8")),
            "9" => Some((WINDOWS_1254, "iso-8859-9")),
            _ => None,
        }
    }

    /// The canonical name of the encoding this converter reads.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Converts the next chunk of input to UTF-8.
    ///
    /// Returns the conversion of the longest prefix of the buffered input
    /// that forms complete code units; the remainder is kept until the next
    /// call. With `eof` set, a dangling incomplete unit is replaced by
    /// U+FFFD instead of being buffered.
    pub fn convert(&mut self, chunk: &[u8], eof: bool) -> Result<String> {
        match &mut self.backend {
            Backend::Rs(decoder) => {
                let mut out = String::with_capacity(
                    decoder
                        .max_utf8_buffer_length(chunk.len())
                        .unwrap_or(chunk.len() * 3),
                );
                let mut src = chunk;
                loop {
                    let (result, read, _replaced) = decoder.decode_to_string(src, &mut out, eof);
                    match result {
                        encoding_rs::CoderResult::InputEmpty => break,
                        encoding_rs::CoderResult::OutputFull => {
                            src = &src[read..];
                            out.reserve(
                                decoder
                                    .max_utf8_buffer_length(src.len())
                                    .unwrap_or(src.len() * 3 + 4),
                            );
                        }
                    }
                }
                Ok(out)
            }
            Backend::Utf32(order) => {
                let order = *order;
                self.carry.extend_from_slice(chunk);
                let complete = self.carry.len() - self.carry.len() % 4;
                let mut out = String::with_capacity(complete / 4 * 4);
                for unit in self.carry[..complete].chunks_exact(4) {
                    let code = match order {
                        WideOrder::BigEndian => u32::from_be_bytes([unit[0], unit[1], unit[2], unit[3]]),
                        WideOrder::LittleEndian => u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]),
                    };
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                self.carry.drain(..complete);
                if eof && !self.carry.is_empty() {
                    self.carry.clear();
                    out.push(char::REPLACEMENT_CHARACTER);
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn utf32be(text: &str) -> Vec<u8> {
        text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect()
    }

    #[test]
    fn bom_detection() {
        assert_eq!(detect_bom(b"\xEF\xBB\xBFabc"), Some(("utf-8", 3)));
        assert_eq!(detect_bom(b"\xFE\xFF\x00a"), Some(("utf-16be", 2)));
        assert_eq!(detect_bom(b"\xFF\xFEa\x00"), Some(("utf-16le", 2)));
        assert_eq!(detect_bom(b"\x00\x00\xFE\xFF"), Some(("utf-32be", 4)));
        assert_eq!(detect_bom(b"\xFF\xFE\x00\x00"), Some(("utf-32le", 4)));
        assert_eq!(detect_bom(b"<doc"), None);
        assert_eq!(detect_bom(b"\xEF\xBB"), None);
    }

    #[test]
    fn charset_detection_by_stride() {
        assert_eq!(detect_charset(b"<doc>hello</doc>"), Some("utf-8"));
        assert_eq!(detect_charset(&utf16le("<doc>hello</doc>")), Some("utf-16le"));
        let utf16be: Vec<u8> = "<doc/>".encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        assert_eq!(detect_charset(&utf16be), Some("utf-16be"));
        assert_eq!(detect_charset(&utf32be("<doc/>")), Some("utf-32be"));
    }

    #[test]
    fn utf16_chunked_conversion() {
        let bytes = utf16le("chunked conversion");
        let mut encoder = TextEncoder::for_name("UTF-16LE").unwrap();
        let mut out = String::new();
        // Split in the middle of a code unit
        out.push_str(&encoder.convert(&bytes[..5], false).unwrap());
        out.push_str(&encoder.convert(&bytes[5..], true).unwrap());
        assert_eq!(out, "chunked conversion");
    }

    #[test]
    fn utf32_conversion_with_carry() {
        let bytes = utf32be("wide");
        let mut encoder = TextEncoder::for_name("utf-32be").unwrap();
        let mut out = String::new();
        out.push_str(&encoder.convert(&bytes[..6], false).unwrap());
        out.push_str(&encoder.convert(&bytes[6..], true).unwrap());
        assert_eq!(out, "wide");
    }

    #[test]
    fn iso_8859_aliases() {
        assert!(TextEncoder::for_name("ISO-8859-1").is_ok());
        assert!(TextEncoder::for_name("isolatin-1").is_ok());
        assert!(TextEncoder::for_name("latin9").is_err());
        assert!(TextEncoder::for_name("koi8-r").is_err());
    }

    #[test]
    fn iso_8859_1_bytes() {
        let mut encoder = TextEncoder::for_name("iso-8859-1").unwrap();
        let out = encoder.convert(&[0x63, 0x61, 0x66, 0xE9], true).unwrap();
        assert_eq!(out, "caf\u{e9}");
    }
}
