//! NavGuard Core Library
//!
//! This crate provides the classification pipeline and the per-navigation
//! verdict engine for the NavGuard navigation guard.
//!
//! # Architecture
//!
//! Every completed page load is resolved to a hostname, run through a small
//! set of synchronous heuristics, and, when any heuristic is suspicious,
//! confirmed against a remote reputation index. The verdict is written back
//! through a single reconciliation point that only the most recent
//! navigation of a tab may write through.
//!
//! # Modules
//!
//! - `url`: Hostname resolution, scheme extraction and `www.` canonicalisation
//! - `tld`: Recognised / whitelisted suffix classification
//! - `rules`: Heuristic rule set producing violation results
//! - `reputation`: Reputation service port, dedupe set and index parsing
//! - `http`: reqwest-backed reputation service (feature `http`)
//! - `engine`: Navigation verdict engine and generation tracking
//! - `overlay`: Page lock overlay model (page commands, banner, input traps)
//! - `config`: Guard configuration
//! - `error`: Error types
//! - `types`: Shared type definitions

pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod overlay;
pub mod reputation;
pub mod rules;
pub mod tld;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use config::GuardConfig;
pub use engine::{
    Admission, BadgeSurface, Navigation, NavigationOutcome, NavigationPipeline, PageMessenger, VerdictEngine,
};
pub use error::{ConfigError, GuardError, ParseFailure};
pub use overlay::{CheckLink, PageCommand, TrapPolicy};
pub use reputation::{ReputationClient, ReputationIndex, ReputationService};
pub use rules::{Evaluation, RuleSet, ViolationResult};
pub use tld::{TldClass, TldClassSet};
pub use types::{BadgeState, LoadStatus, NavigationEvent, Verdict};
pub use url::{resolve_hostname, strip_www};
