//! Filename derivation for archived artifacts.
//!
//! Names come from `Content-Disposition` when the server sends one and from
//! the URL path otherwise. Every name is sanitized before it reaches a file
//! store, which may use it as a path component.

use std::path::{Component, Path};

use tracing::debug;
use url::Url;

/// Name used when neither the headers nor the URL provide one.
pub const FALLBACK_FILENAME: &str = "downloaded_file";

/// Suffix marking a single-file HTML snapshot.
pub const SNAPSHOT_SUFFIX: &str = ".obelisk.html";

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987, preferred)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + "filename*=".len()..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name)
                && !decoded.is_empty()
            {
                return Some(decoded.into_owned());
            }
        }
    }

    // `filename*=` also contains `filename`, so look for the plain form by
    // its own parameter boundary.
    let plain = header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;

    let name = if let Some(stripped) = plain.strip_prefix('"') {
        stripped.find('"').map_or(stripped, |end| &stripped[..end])
    } else {
        plain.trim()
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Sanitizes a filename for use as a single path component.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters, and neutralizes `.`/`..`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Last non-empty path segment of `url`, percent-decoded.
///
/// Query and fragment never contribute since they are not path segments.
#[must_use]
pub fn last_path_segment(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(
        |e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.to_string()
        },
        std::borrow::Cow::into_owned,
    );
    (!decoded.is_empty()).then_some(decoded)
}

/// Filename for a direct download: Content-Disposition, URL path, then
/// [`FALLBACK_FILENAME`].
#[must_use]
pub fn download_filename(content_disposition: Option<&str>, url: &Url) -> String {
    if let Some(name) = content_disposition.and_then(parse_content_disposition) {
        return sanitize_filename(&name);
    }
    if let Some(segment) = last_path_segment(url) {
        return sanitize_filename(&segment);
    }
    FALLBACK_FILENAME.to_string()
}

/// Filename for an HTML snapshot of `url`.
///
/// The last path segment (or `index` for an empty path) loses any `.html`
/// or `.htm` extension and gains [`SNAPSHOT_SUFFIX`].
#[must_use]
pub fn snapshot_filename(url: &Url) -> String {
    let segment = last_path_segment(url).unwrap_or_else(|| "index.html".to_string());
    let stem = segment
        .strip_suffix(".html")
        .or_else(|| segment.strip_suffix(".htm"))
        .unwrap_or(&segment);
    sanitize_filename(&format!("{stem}{SNAPSHOT_SUFFIX}"))
}
