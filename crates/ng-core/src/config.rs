//! Guard configuration
//!
//! Loaded from JSON; every field has a default so an empty object is a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::rules::RuleSet;
use crate::tld::{TldClassSet, DEFAULT_RECOGNISED, DEFAULT_WHITELISTED};
use crate::url::DEFAULT_INTERNAL_SCHEMES;

pub const DEFAULT_SERVICE_URL: &str = "https://nrpboxnv6vwrbkelfndmnm5mrm0qhlgh.lambda-url.ap-southeast-1.on.aws/";
pub const DEFAULT_WARNING: &str = " this website is not approved, all clicks have been disabled.";
pub const DEFAULT_BANNER_IMAGE: &str = "img/dead48.png";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Reputation service endpoints.
pub mod endpoint {
    pub const INSERT_HISTORY: &str = "insert-history";
    pub const QUERY: &str = "query";
    pub const LOOKUP: &str = "lookup";
}

/// Runtime configuration for the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Base URL of the reputation service
    pub service_url: String,
    /// Per-request timeout for reputation calls, in milliseconds
    pub request_timeout_ms: u64,
    /// Schemes of browser-internal pages that are never classified
    pub internal_schemes: Vec<String>,
    /// Institutional / government suffixes
    pub recognised_tlds: Vec<String>,
    /// Commercial suffixes
    pub whitelisted_tlds: Vec<String>,
    /// Whether a whitelisted suffix still needs reputation confirmation
    pub confirm_whitelisted: bool,
    /// Banner message for unsafe pages (may contain HTML)
    pub warning_message: String,
    /// Extension-relative path of the banner icon
    pub banner_image: String,
    /// Offer an in-depth check link in the banner
    pub offer_check_link: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            internal_schemes: DEFAULT_INTERNAL_SCHEMES.iter().map(|s| s.to_string()).collect(),
            recognised_tlds: DEFAULT_RECOGNISED.iter().map(|s| s.to_string()).collect(),
            whitelisted_tlds: DEFAULT_WHITELISTED.iter().map(|s| s.to_string()).collect(),
            confirm_whitelisted: true,
            warning_message: DEFAULT_WARNING.to_string(),
            banner_image: DEFAULT_BANNER_IMAGE.to_string(),
            offer_check_link: false,
        }
    }
}

impl GuardConfig {
    /// Parse a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.tld_sets()?;
        self.service_base()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tld_sets(&self) -> Result<TldClassSet, ConfigError> {
        TldClassSet::new(&self.recognised_tlds, &self.whitelisted_tlds)
    }

    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        Ok(RuleSet::new(self.tld_sets()?, self.confirm_whitelisted))
    }

    /// Service base URL, normalised to end in `/` so endpoints join below it.
    pub fn service_base(&self) -> Result<Url, ConfigError> {
        let mut raw = self.service_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|_| ConfigError::InvalidBaseUrl(self.service_url.clone()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(self.service_url.clone()));
        }
        Ok(base)
    }

    /// Full URL of a service endpoint, optionally carrying `domainName`.
    pub fn endpoint_url(&self, path: &str, hostname: Option<&str>) -> Result<Url, ConfigError> {
        let base = self.service_base()?;
        Ok(endpoint_url(&base, path, hostname))
    }
}

/// Join an endpoint onto a base URL and append `domainName` when given.
pub fn endpoint_url(base: &Url, path: &str, hostname: Option<&str>) -> Url {
    let mut url = base.clone();
    // A base from `service_base` always has path segments
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(path);
    }
    if let Some(host) = hostname {
        url.query_pairs_mut().append_pair("domainName", host);
    }
    url
}
