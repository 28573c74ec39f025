//! Top-level suffix classification
//!
//! A hostname is classified by the longest known suffix it ends in, walking
//! label boundaries from the most specific parent towards the last label.
//!
//! # Examples
//!
//! ```
//! use ng_core::tld::{TldClass, TldClassSet};
//!
//! let sets = TldClassSet::default();
//! assert_eq!(sets.classify("school.edu.sg"), TldClass::Recognised);
//! assert_eq!(sets.classify("shop.com"), TldClass::Whitelisted);
//! assert_eq!(sets.classify("phish.biz"), TldClass::Unknown);
//! ```

use std::collections::HashSet;

use crate::error::ConfigError;

/// Institutional / government suffixes.
pub const DEFAULT_RECOGNISED: &[&str] = &["moe.edu.sg", "edu.sg", "edu", "gov.sg", "gov", "bnpparibas"];

/// Common commercial suffixes.
pub const DEFAULT_WHITELISTED: &[&str] = &["net", "com", "org", "com.sg", "sg"];

// =============================================================================
// TLD Class
// =============================================================================

/// Which set, if any, a hostname's suffix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TldClass {
    Recognised,
    Whitelisted,
    Unknown,
}

impl TldClass {
    #[inline]
    pub fn is_recognised(self) -> bool {
        self == Self::Recognised
    }

    #[inline]
    pub fn is_whitelisted(self) -> bool {
        self == Self::Whitelisted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recognised => "recognised",
            Self::Whitelisted => "whitelisted",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Class Sets
// =============================================================================

/// Two disjoint suffix sets. Suffixes are stored lowercase without a
/// leading dot.
#[derive(Debug, Clone)]
pub struct TldClassSet {
    recognised: HashSet<String>,
    whitelisted: HashSet<String>,
}

impl Default for TldClassSet {
    fn default() -> Self {
        // Defaults are disjoint
        Self {
            recognised: DEFAULT_RECOGNISED.iter().map(|s| s.to_string()).collect(),
            whitelisted: DEFAULT_WHITELISTED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TldClassSet {
    /// Build class sets, rejecting a suffix that appears in both.
    pub fn new<I, J, S, T>(recognised: I, whitelisted: J) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let recognised: HashSet<String> = recognised
            .into_iter()
            .map(|s| normalize_suffix(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        let whitelisted: HashSet<String> = whitelisted
            .into_iter()
            .map(|s| normalize_suffix(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();

        if let Some(overlap) = recognised.intersection(&whitelisted).min() {
            return Err(ConfigError::OverlappingSuffix(overlap.clone()));
        }

        Ok(Self {
            recognised,
            whitelisted,
        })
    }

    /// Classify a single suffix (exact membership).
    #[inline]
    pub fn suffix_class(&self, suffix: &str) -> Option<TldClass> {
        if self.recognised.contains(suffix) {
            Some(TldClass::Recognised)
        } else if self.whitelisted.contains(suffix) {
            Some(TldClass::Whitelisted)
        } else {
            None
        }
    }

    /// Classify a hostname by its longest known suffix.
    pub fn classify(&self, host: &str) -> TldClass {
        self.matched_suffix(host)
            .map(|(_, class)| class)
            .unwrap_or(TldClass::Unknown)
    }

    /// Longest known suffix of `host` and its class.
    ///
    /// The host itself is never a candidate: `edu.sg` as a hostname is
    /// classified by `sg`.
    pub fn matched_suffix<'a>(&self, host: &'a str) -> Option<(&'a str, TldClass)> {
        walk_parent_suffixes(host).find_map(|suffix| self.suffix_class(suffix).map(|class| (suffix, class)))
    }

    /// Number of known suffixes across both sets.
    pub fn len(&self) -> usize {
        self.recognised.len() + self.whitelisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_suffix(s: &str) -> String {
    s.trim().trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase()
}

// =============================================================================
// Suffix Walking
// =============================================================================

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over the proper suffixes of a host, most specific first.
pub struct ParentSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for ParentSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk `a.b.c` as `b.c`, `c`.
pub fn walk_parent_suffixes(host: &str) -> ParentSuffixIter<'_> {
    ParentSuffixIter {
        current: get_parent_domain(host),
    }
}
