//! URL utilities for the navigation pipeline
//!
//! Hostname resolution goes through the `url` crate so that whatever the
//! browser reports is parsed with standard URL semantics. The scheme helpers
//! work directly on string slices and never allocate.

use url::Url;

use crate::error::ParseFailure;
use crate::types::SchemeMask;

/// Schemes of browser-internal pages that never get a verdict.
pub const DEFAULT_INTERNAL_SCHEMES: &[&str] = &[
    "chrome",
    "chrome-extension",
    "chrome-search",
    "devtools",
    "edge",
    "about",
    "moz-extension",
    "view-source",
];

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Fast scheme extraction without URL parsing.
/// Returns the scheme mask or None if unknown.
#[inline]
pub fn extract_scheme(url: &str) -> Option<SchemeMask> {
    let bytes = url.as_bytes();
    if bytes.len() < 5 {
        return None;
    }

    // Lowercase first char
    let c0 = bytes[0] | 0x20;

    match c0 {
        b'h' => {
            if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
                Some(SchemeMask::HTTPS)
            } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
                Some(SchemeMask::HTTP)
            } else {
                None
            }
        }
        b'w' => {
            if bytes.len() >= 6 && bytes[..6].eq_ignore_ascii_case(b"wss://") {
                Some(SchemeMask::WSS)
            } else if bytes[..5].eq_ignore_ascii_case(b"ws://") {
                Some(SchemeMask::WS)
            } else {
                None
            }
        }
        b'f' => {
            if bytes.len() >= 6 && bytes[..6].eq_ignore_ascii_case(b"ftp://") {
                Some(SchemeMask::FTP)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Scheme name before the first ':' (not lowercased).
#[inline]
pub fn scheme_name(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    let valid = !scheme.is_empty()
        && scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.');
    valid.then_some(scheme)
}

/// Check whether a URL points at a browser-internal page.
pub fn is_internal_page<S: AsRef<str>>(url: &str, internal_schemes: &[S]) -> bool {
    match scheme_name(url.trim_start()) {
        Some(scheme) => internal_schemes
            .iter()
            .any(|s| s.as_ref().eq_ignore_ascii_case(scheme)),
        None => false,
    }
}

// =============================================================================
// Hostname Resolution
// =============================================================================

/// A navigation URL that resolved to a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNavigation {
    /// URL as reported by the browser
    pub url: String,
    /// Lowercase hostname, no trailing dot
    pub hostname: String,
    /// Scheme, if it is one of the web schemes
    pub scheme: Option<SchemeMask>,
}

/// Parse a navigation URL and extract its normalised hostname.
pub fn parse_navigation<S: AsRef<str>>(
    url: &str,
    internal_schemes: &[S],
) -> Result<ParsedNavigation, ParseFailure> {
    if is_internal_page(url, internal_schemes) {
        return Err(ParseFailure::InternalPage(url.to_string()));
    }

    let parsed = Url::parse(url.trim()).map_err(|e| ParseFailure::Invalid {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ParseFailure::MissingHost(url.to_string()))?;

    let hostname = host.trim_end_matches('.').to_ascii_lowercase();
    if hostname.is_empty() {
        return Err(ParseFailure::MissingHost(url.to_string()));
    }

    // Serialised form is normalised, so the fast path is exact here
    Ok(ParsedNavigation {
        url: url.to_string(),
        hostname,
        scheme: extract_scheme(parsed.as_str()),
    })
}

/// Resolve a navigation URL to its normalised hostname.
pub fn resolve_hostname<S: AsRef<str>>(
    url: &str,
    internal_schemes: &[S],
) -> Result<String, ParseFailure> {
    parse_navigation(url, internal_schemes).map(|nav| nav.hostname)
}

// =============================================================================
// Canonicalisation
// =============================================================================

/// Strip a single leading `www.` label (case-insensitive).
#[inline]
pub fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}
