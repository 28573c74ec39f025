//! Error types for the classification pipeline.

/// Why a navigation URL could not be resolved to a hostname.
///
/// The event is dropped; these are logged, never surfaced to the page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("Browser-internal page: {0}")]
    InternalPage(String),
    #[error("Invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Reputation service failures.
///
/// None of these may be read as a Safe verdict: the navigation stays
/// unresolved and the badge is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Reputation request timed out")]
    Timeout,
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),
    #[error("Malformed reputation response: {0}")]
    Schema(String),
    #[error("Failed to decode reputation response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Suffix '{0}' is both recognised and whitelisted")]
    OverlappingSuffix(String),
    #[error("Invalid service URL '{0}'")]
    InvalidBaseUrl(String),
    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,
}
