//! Ordered, first-match-wins archival rules.
//!
//! Every rule tests exactly one predicate: either the URL's hostname or the
//! probed MIME type. The first rule whose predicate holds picks the archival
//! tool; when none does, [`DO_NOTHING_TOOL`] is returned.
//!
//! # Example
//!
//! ```
//! use link_archiver::rules::{ArchivalRule, RuleKind, select_tool};
//!
//! let rules = vec![
//!     ArchivalRule::new(RuleKind::Hostname, "*.example.com", "obelisk"),
//!     ArchivalRule::new(RuleKind::MimeType, "image/*", "direct_download"),
//! ];
//!
//! assert_eq!(select_tool("https://www.example.com/a", "text/html", &rules), "obelisk");
//! assert_eq!(select_tool("https://cdn.net/cat.png", "image/png", &rules), "direct_download");
//! assert_eq!(select_tool("https://cdn.net/a.pdf", "application/pdf", &rules), "do_nothing");
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use url::Url;

/// Sentinel tool name meaning "do not archive". Never registered as a tool.
pub const DO_NOTHING_TOOL: &str = "do_nothing";

/// Which attribute of a URL a rule inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Match against the URL's hostname.
    Hostname,
    /// Match against the probed MIME type.
    MimeType,
    /// A kind this version does not understand; it never matches.
    Unknown(String),
}

impl RuleKind {
    /// The serialized form of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hostname => "hostname",
            Self::MimeType => "mimetype",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RuleKind {
    fn from(raw: &str) -> Self {
        match raw {
            "hostname" => Self::Hostname,
            "mimetype" => Self::MimeType,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Serialize for RuleKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// One ordered routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalRule {
    /// The attribute this rule inspects.
    pub kind: RuleKind,
    /// Exact value or wildcard. Empty matches unconditionally.
    #[serde(default)]
    pub pattern: String,
    /// Name of the tool to use when this rule matches.
    #[serde(rename = "archivalTool", default)]
    pub tool: String,
}

impl ArchivalRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(kind: RuleKind, pattern: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            tool: tool.into(),
        }
    }

    /// The catch-all rule appended after user rules.
    #[must_use]
    pub fn catch_all(tool: impl Into<String>) -> Self {
        Self::new(RuleKind::MimeType, "", tool)
    }

    /// Whether this rule matches unconditionally.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.pattern.is_empty()
    }
}

/// Picks the archival tool for `url` with MIME type `mime_type`.
///
/// An unparsable URL is treated as having an empty hostname, so only
/// MIME-type rules and catch-alls can match it. Hostnames are compared as
/// written in the URL, case included.
#[must_use]
pub fn select_tool(url: &str, mime_type: &str, rules: &[ArchivalRule]) -> String {
    let hostname = hostname_as_written(url).unwrap_or_default();

    for (index, rule) in rules.iter().enumerate() {
        if rule_matches(hostname, mime_type, rule) {
            debug!(
                url,
                rule_index = index,
                kind = %rule.kind,
                pattern = %rule.pattern,
                tool = %rule.tool,
                "archival rule matched"
            );
            return rule.tool.clone();
        }
    }

    debug!(url, mime_type, "no archival rule matched");
    DO_NOTHING_TOOL.to_string()
}

/// The host of a valid URL exactly as spelled in `url`.
///
/// `Url` lowercases and punycode-encodes hosts, so the text is sliced out of
/// the input once parsing has accepted it. Userinfo, port and IPv6 brackets
/// are stripped.
fn hostname_as_written(url: &str) -> Option<&str> {
    let url = url.trim();
    Url::parse(url).ok().filter(Url::has_host)?;

    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '\\', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if let Some(bracketed) = host_port.strip_prefix('[') {
        return bracketed.split_once(']').map(|(host, _)| host);
    }
    Some(host_port.split_once(':').map_or(host_port, |(host, _)| host))
}

/// Tests a single rule against a hostname and MIME type.
#[must_use]
pub fn rule_matches(hostname: &str, mime_type: &str, rule: &ArchivalRule) -> bool {
    match rule.kind {
        RuleKind::Unknown(_) => false,
        _ if rule.pattern.is_empty() => true,
        RuleKind::Hostname => hostname_matches(hostname, &rule.pattern),
        RuleKind::MimeType => mime_type_matches(mime_type, &rule.pattern),
    }
}

/// Exact match, or `*.suffix` matching `suffix` itself and any subdomain.
#[must_use]
pub fn hostname_matches(hostname: &str, pattern: &str) -> bool {
    if hostname.is_empty() || pattern.is_empty() {
        return false;
    }
    if hostname == pattern {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) if !suffix.is_empty() => {
            hostname == suffix
                || hostname
                    .strip_suffix(suffix)
                    .is_some_and(|head| head.ends_with('.'))
        }
        _ => false,
    }
}

/// Exact match, or `type/*` matching any subtype of `type`.
#[must_use]
pub fn mime_type_matches(mime_type: &str, pattern: &str) -> bool {
    if mime_type.is_empty() || pattern.is_empty() {
        return false;
    }
    if mime_type == pattern {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => mime_type
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/')),
        None => false,
    }
}
