//! Heuristic rule set
//!
//! Three independent predicates over a resolved navigation. Each yields a
//! [`ViolationResult`]; the verdict is a disjunction over all of them, so
//! rule order never matters.

use crate::tld::{TldClass, TldClassSet};
use crate::types::{SchemeMask, Suspicion};
use crate::url::ParsedNavigation;

/// Rules that produce a plain violated / not-violated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// URL embeds an `@`
    CredentialEmbedding,
    /// URL uses plain http
    InsecureScheme,
}

impl RuleKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::CredentialEmbedding => "credential-embedding",
            Self::InsecureScheme => "insecure-scheme",
        }
    }
}

/// Result of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationResult {
    Boolean { rule: RuleKind, violated: bool },
    TldStatus { recognised: bool, whitelisted: bool },
}

impl ViolationResult {
    /// Suspicion flags contributed by this result.
    pub fn suspicion(&self) -> Suspicion {
        match *self {
            Self::Boolean { violated: false, .. } => Suspicion::empty(),
            Self::Boolean { rule: RuleKind::CredentialEmbedding, violated: true } => Suspicion::CREDENTIALS,
            Self::Boolean { rule: RuleKind::InsecureScheme, violated: true } => Suspicion::INSECURE_SCHEME,
            Self::TldStatus { recognised: true, .. } => Suspicion::empty(),
            Self::TldStatus { recognised: false, whitelisted: true } => {
                Suspicion::UNRECOGNISED_TLD | Suspicion::WHITELISTED_TLD
            }
            Self::TldStatus { recognised: false, whitelisted: false } => {
                Suspicion::UNRECOGNISED_TLD | Suspicion::UNKNOWN_TLD
            }
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Credential-embedding check: any `@` in the URL.
#[inline]
pub fn contains_credentials(url: &str) -> bool {
    url.contains('@')
}

/// Insecure-scheme check: the page was loaded over plain http.
#[inline]
pub fn is_insecure_scheme(scheme: Option<SchemeMask>) -> bool {
    scheme == Some(SchemeMask::HTTP)
}

// =============================================================================
// Rule Set
// =============================================================================

/// Outcome of running every rule against one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub results: Vec<ViolationResult>,
    pub suspicion: Suspicion,
    pub tld: TldClass,
    confirm_whitelisted: bool,
}

impl Evaluation {
    /// Whether the reputation index must confirm this host before it is
    /// treated as safe.
    pub fn requires_confirmation(&self) -> bool {
        if self.suspicion.intersects(Suspicion::CREDENTIALS | Suspicion::INSECURE_SCHEME | Suspicion::UNKNOWN_TLD) {
            return true;
        }
        self.suspicion.contains(Suspicion::WHITELISTED_TLD) && self.confirm_whitelisted
    }

    /// Names of the flags that fired, for logging.
    pub fn describe(&self) -> Vec<&'static str> {
        self.suspicion.iter_names().map(|(name, _)| name).collect()
    }
}

/// The heuristic rule set.
#[derive(Debug, Clone)]
pub struct RuleSet {
    tlds: TldClassSet,
    confirm_whitelisted: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(TldClassSet::default(), true)
    }
}

impl RuleSet {
    /// `confirm_whitelisted` decides whether a whitelisted (commercial)
    /// suffix still has to be confirmed by the reputation index.
    pub fn new(tlds: TldClassSet, confirm_whitelisted: bool) -> Self {
        Self {
            tlds,
            confirm_whitelisted,
        }
    }

    pub fn tlds(&self) -> &TldClassSet {
        &self.tlds
    }

    /// Run every rule. Synchronous, never suspends.
    pub fn evaluate(&self, nav: &ParsedNavigation) -> Evaluation {
        let tld = self.tlds.classify(&nav.hostname);
        let results = vec![
            ViolationResult::Boolean {
                rule: RuleKind::CredentialEmbedding,
                violated: contains_credentials(&nav.url),
            },
            ViolationResult::Boolean {
                rule: RuleKind::InsecureScheme,
                violated: is_insecure_scheme(nav.scheme),
            },
            ViolationResult::TldStatus {
                recognised: tld.is_recognised(),
                whitelisted: tld.is_whitelisted(),
            },
        ];

        let suspicion = results
            .iter()
            .fold(Suspicion::empty(), |acc, r| acc | r.suspicion());

        Evaluation {
            results,
            suspicion,
            tld,
            confirm_whitelisted: self.confirm_whitelisted,
        }
    }
}
