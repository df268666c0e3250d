//! URL extraction and validation from message text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

/// Bare `http://` / `https://` tokens, stopping at whitespace, brackets, quotes
/// and the other characters that never appear unescaped in a link.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).expect("URL regex is valid") // Static pattern, safe to panic
});

/// Markdown inline links: `[label](target)`.
#[allow(clippy::expect_used)]
static MARKDOWN_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("markdown link regex is valid") // Static pattern, safe to panic
});

/// Punctuation stripped from both ends of a bare URL candidate.
const TRIM_CHARS: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

/// Extracts every absolute URL from `text`.
///
/// Bare links are collected first, then markdown link targets. The result
/// keeps first-seen order and never contains the same URL twice. Candidates
/// that do not parse as an absolute URL with a scheme and a host are dropped
/// silently.
///
/// # Examples
///
/// ```
/// use link_archiver::parser::extract_urls;
///
/// let urls = extract_urls("https://a.com/x, again https://a.com/x.");
/// assert_eq!(urls, vec!["https://a.com/x"]);
/// ```
#[tracing::instrument(level = "debug", skip(text), fields(text_len = text.len()))]
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();

    for url_match in URL_PATTERN.find_iter(text) {
        let candidate = url_match.as_str().trim_matches(TRIM_CHARS);
        trace!(url = %candidate, "found URL candidate");
        accept(candidate, &mut urls, &mut seen);
    }

    for captures in MARKDOWN_LINK_PATTERN.captures_iter(text) {
        if let Some(target) = captures.get(2) {
            trace!(url = %target.as_str(), "found markdown link target");
            accept(target.as_str(), &mut urls, &mut seen);
        }
    }

    debug!(count = urls.len(), "extracted URLs");
    urls
}

fn accept(candidate: &str, urls: &mut Vec<String>, seen: &mut HashSet<String>) {
    if !is_absolute_url(candidate) {
        trace!(url = %candidate, "dropping candidate that is not an absolute URL");
        return;
    }
    if seen.insert(candidate.to_string()) {
        urls.push(candidate.to_string());
    }
}

/// Returns true when `candidate` parses as a URL with a non-empty scheme and host.
#[must_use]
pub fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate).ok().is_some_and(|url| {
        !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty())
    })
}
