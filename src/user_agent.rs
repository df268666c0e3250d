//! Shared User-Agent string for probe and archival HTTP traffic.
//!
//! Single source for the project URL and UA format so probes, downloads and
//! page snapshots identify themselves the same way.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fmartingr/link-archiver";

/// Default User-Agent for every outbound request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("link-archiver/{version} (chat-link-archiver; +{PROJECT_UA_URL})")
}
