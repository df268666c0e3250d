//! Link extraction from chat message text.
//!
//! Messages arrive as free-form text that may mix prose, bare links and
//! markdown-style `[label](target)` links. The extractor pulls out every
//! absolute URL exactly once, in the order it first appears.
//!
//! # Example
//!
//! ```
//! use link_archiver::parser::extract_urls;
//!
//! let urls = extract_urls("see https://a.com/x and [label](https://b.com/y)");
//! assert_eq!(urls, vec!["https://a.com/x", "https://b.com/y"]);
//! ```

mod url;

pub use url::{extract_urls, is_absolute_url};
