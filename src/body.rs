//! Best-effort decoding of the proprietary binary rich-text body format.
//!
//! Message bodies arrive as an archived, type-tagged byte stream. The layout
//! is undocumented and varies between export versions, so decoding is
//! strictly best-effort: the primary string payload is recovered when
//! possible, recognizable class tags and attribute keys are collected, and
//! anything unknown is skipped. Decode failures never cross this module
//! boundary; every failure path yields `ParsedBody::default()`.

use serde_json::Value;

use crate::models::ParsedBody;

/// Magic prefix of the archived stream format
const STREAM_HEADER: &[u8] = b"streamtyped";

/// Class tags worth surfacing in `components` when present in the stream
const KNOWN_CLASS_TAGS: &[&str] = &[
    "NSMutableAttributedString",
    "NSAttributedString",
    "NSMutableString",
    "NSString",
    "NSDictionary",
    "NSNumber",
    "NSURL",
    "NSValue",
];

/// Decode a binary rich-text blob into text, components, and metadata.
///
/// Never panics and never returns an error: `None`, truncated, or garbage
/// input all produce the default empty result.
#[must_use]
pub fn parse_attributed_body(blob: Option<&[u8]>) -> ParsedBody {
    let Some(blob) = blob else {
        return ParsedBody::default();
    };
    if blob.is_empty() || find(blob, STREAM_HEADER).is_none() {
        return ParsedBody::default();
    }

    let mut parsed = ParsedBody::default();

    for tag in KNOWN_CLASS_TAGS {
        let count = count_occurrences(blob, tag.as_bytes());
        if count > 0 {
            parsed
                .components
                .insert((*tag).to_string(), Value::from(count));
        }
    }

    parsed.text = extract_primary_string(blob);

    // Attribute keys ("__kIMMessagePartAttributeName" and friends) mark the
    // dictionary payloads attached to ranges of the attributed string.
    for key in extract_attribute_keys(blob) {
        parsed.metadata.entry(key).or_insert(Value::Null);
    }

    parsed
}

/// Resolve the display text for a message.
///
/// Prefers the raw `text` column when it is non-blank, falls back to the
/// decoded body text, and returns an empty string when neither is usable.
/// Callers treat the empty string as "no text, no hash".
#[must_use]
pub fn finalize_text(raw_text: Option<&str>, parsed_body: &ParsedBody) -> String {
    if let Some(raw) = raw_text {
        if !raw.trim().is_empty() {
            return raw.to_string();
        }
    }
    match &parsed_body.text {
        Some(text) if !text.trim().is_empty() => text.clone(),
        _ => String::new(),
    }
}

/// Extract the primary NSString payload from the stream.
///
/// The string record sits after the first `NSString` class reference:
/// five bytes of archiver framing, then a length marker. A single byte
/// carries lengths below 0x80; the markers 0x81/0x82 switch to u16/u32
/// little-endian lengths.
fn extract_primary_string(blob: &[u8]) -> Option<String> {
    let marker = find(blob, b"NSString")?;
    let mut pos = marker + b"NSString".len() + 5;

    let (len, consumed) = read_length(blob, pos)?;
    pos += consumed;

    let end = pos.checked_add(len)?;
    if end > blob.len() {
        return None;
    }

    let text = String::from_utf8_lossy(&blob[pos..end]).into_owned();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Read a length marker at `pos`, returning (length, bytes consumed).
fn read_length(blob: &[u8], pos: usize) -> Option<(usize, usize)> {
    let first = *blob.get(pos)?;
    match first {
        0x81 => {
            let lo = *blob.get(pos + 1)? as usize;
            let hi = *blob.get(pos + 2)? as usize;
            Some(((hi << 8) | lo, 3))
        }
        0x82 => {
            let mut len = 0usize;
            for i in 0..4 {
                len |= (*blob.get(pos + 1 + i)? as usize) << (8 * i);
            }
            Some((len, 5))
        }
        b if b < 0x80 => Some((b as usize, 1)),
        _ => None,
    }
}

/// Collect `__kIM*` attribute key names embedded in the stream.
fn extract_attribute_keys(blob: &[u8]) -> Vec<String> {
    let mut keys = Vec::new();
    let mut offset = 0;
    while let Some(idx) = find(&blob[offset..], b"__kIM") {
        let start = offset + idx;
        let mut end = start;
        while end < blob.len() && is_key_byte(blob[end]) {
            end += 1;
        }
        if end > start + b"__kIM".len() {
            keys.push(String::from_utf8_lossy(&blob[start..end]).into_owned());
        }
        offset = end.max(start + 1);
    }
    keys
}

const fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid stream around the given text payload.
    fn make_blob(text: &str) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"\x04\x0bstreamtyped\x81\xe8\x03");
        blob.extend_from_slice(b"NSString");
        blob.extend_from_slice(&[0x01, 0x94, 0x84, 0x01, 0x2b]); // archiver framing
        if text.len() < 0x80 {
            blob.push(text.len() as u8);
        } else {
            blob.push(0x81);
            blob.extend_from_slice(&(text.len() as u16).to_le_bytes());
        }
        blob.extend_from_slice(text.as_bytes());
        blob
    }

    #[test]
    fn decodes_short_string_payload() {
        let blob = make_blob("hello https://open.spotify.com/track/123");
        let parsed = parse_attributed_body(Some(&blob));
        assert_eq!(
            parsed.text.as_deref(),
            Some("hello https://open.spotify.com/track/123")
        );
        assert!(parsed.components.contains_key("NSString"));
    }

    #[test]
    fn decodes_two_byte_length_payload() {
        let long = "x".repeat(300);
        let blob = make_blob(&long);
        let parsed = parse_attributed_body(Some(&blob));
        assert_eq!(parsed.text.as_deref(), Some(long.as_str()));
    }

    #[test]
    fn none_input_yields_default() {
        assert_eq!(parse_attributed_body(None), ParsedBody::default());
    }

    #[test]
    fn garbage_input_yields_default() {
        let garbage = vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x7f];
        assert_eq!(parse_attributed_body(Some(&garbage)), ParsedBody::default());
    }

    #[test]
    fn truncated_length_never_panics() {
        let mut blob = make_blob("hello");
        blob.truncate(blob.len() - 3); // cut into the payload
        let parsed = parse_attributed_body(Some(&blob));
        assert_eq!(parsed.text, None);
    }

    #[test]
    fn collects_attribute_keys() {
        let mut blob = make_blob("hi");
        blob.extend_from_slice(b"\x92\x84__kIMMessagePartAttributeName\x86");
        let parsed = parse_attributed_body(Some(&blob));
        assert!(parsed
            .metadata
            .contains_key("__kIMMessagePartAttributeName"));
    }

    #[test]
    fn finalize_prefers_raw_text() {
        let parsed = ParsedBody {
            text: Some("decoded".to_string()),
            ..ParsedBody::default()
        };
        assert_eq!(finalize_text(Some("raw"), &parsed), "raw");
        assert_eq!(finalize_text(Some("   "), &parsed), "decoded");
        assert_eq!(finalize_text(None, &parsed), "decoded");
        assert_eq!(finalize_text(None, &ParsedBody::default()), "");
    }
}
