//! Content sniffing from the first bytes of a response body.
//!
//! Used only when a server omits `Content-Type`. Recognizes the signatures
//! that matter for archival rules and otherwise decides between plain text
//! and opaque binary.

/// Maximum number of leading bytes inspected.
pub const SNIFF_LEN: usize = 512;

/// Tags that identify an HTML document when they open the content.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact magic prefixes and the MIME type they imply.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"OggS\x00", "application/ogg"),
    (b"\x1aE\xdf\xa3", "video/webm"),
    (b"ID3", "audio/mpeg"),
];

/// Returns the MIME type implied by `data`, or `None` when `data` is empty.
///
/// The result never carries parameters (`text/html`, not
/// `text/html; charset=utf-8`) so it can be matched against rules directly.
#[must_use]
pub fn detect_content_type(data: &[u8]) -> Option<&'static str> {
    if data.is_empty() {
        return None;
    }
    let data = &data[..data.len().min(SNIFF_LEN)];

    let trimmed = skip_leading_whitespace(data);
    if is_html(trimmed) {
        return Some("text/html");
    }
    if trimmed.starts_with(b"<?xml") {
        return Some("text/xml");
    }

    if let Some((_, mime)) = MAGIC.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Some(*mime);
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }

    if data.starts_with(b"\xef\xbb\xbf")
        || data.starts_with(b"\xfe\xff")
        || data.starts_with(b"\xff\xfe")
    {
        return Some("text/plain");
    }
    if (trimmed.starts_with(b"{") || trimmed.starts_with(b"["))
        && !data.iter().any(|&b| is_binary_byte(b))
    {
        return Some("application/json");
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        Some("application/octet-stream")
    } else {
        Some("text/plain")
    }
}

fn skip_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_html(data: &[u8]) -> bool {
    HTML_TAGS.iter().any(|tag| {
        if data.len() <= tag.len() {
            return false;
        }
        let matches_tag = data[..tag.len()]
            .iter()
            .zip(tag.iter())
            .all(|(actual, expected)| actual.to_ascii_uppercase() == *expected);
        matches_tag && matches!(data[tag.len()], b' ' | b'>')
    })
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
