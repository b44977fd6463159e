//! Manage xml character escapes

use std::borrow::Cow;

use memchr::memchr;

/// Escapes the five XML special characters of a text for use in content or
/// attribute values.
pub fn escape(raw: &str) -> Cow<str> {
    let bytes = raw.as_bytes();
    let mut escaped: Option<String> = None;
    let mut start = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        let replacement = match byte {
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'&' => "&amp;",
            b'"' => "&quot;",
            b'\'' => "&apos;",
            _ => continue,
        };
        let out = escaped.get_or_insert_with(|| String::with_capacity(raw.len() + 8));
        out.push_str(&raw[start..i]);
        out.push_str(replacement);
        start = i + 1;
    }
    match escaped {
        Some(mut out) => {
            out.push_str(&raw[start..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(raw),
    }
}

/// Unescapes XML entity and character references in a text.
///
/// The named entities `lt`, `gt`, `amp`, `quot` and `apos` and numeric
/// references (`&#38;`, `&#x26;`) are replaced. An unterminated or unknown
/// reference is passed through literally; the analyzer recovers tokens
/// from imperfect real-world content rather than failing the document.
pub fn unescape(raw: &str) -> Cow<str> {
    let bytes = raw.as_bytes();
    let first = match memchr(b'&', bytes) {
        Some(i) => i,
        None => return Cow::Borrowed(raw),
    };
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..first]);
    let mut at = first;
    while at < bytes.len() {
        if bytes[at] != b'&' {
            let next = memchr(b'&', &bytes[at + 1..]).map_or(bytes.len(), |i| at + 1 + i);
            out.push_str(&raw[at..next]);
            at = next;
            continue;
        }
        let end = match memchr(b';', &bytes[at + 1..]) {
            Some(i) if i <= 10 => at + 1 + i,
            _ => {
                out.push('&');
                at += 1;
                continue;
            }
        };
        match resolve_reference(&raw[at + 1..end]) {
            Some(ch) => out.push(ch),
            None => out.push_str(&raw[at..=end]),
        }
        at = end + 1;
    }
    Cow::Owned(out)
}

fn resolve_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                digits.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_round() {
        assert_eq!(escape("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape("plain"), "plain");
        assert_eq!(unescape("a &lt; b &amp; c"), "a < b & c");
    }

    #[test]
    fn unescape_numeric() {
        assert_eq!(unescape("&#65;&#x42;"), "AB");
    }

    #[test]
    fn unescape_keeps_unknown_references() {
        assert_eq!(unescape("&unknown; & &#badref;"), "&unknown; & &#badref;");
    }
}
