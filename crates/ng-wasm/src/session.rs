//! Background-page session
//!
//! The extension's background script performs the `fetch` calls and the
//! `chrome.action` / `chrome.tabs` writes; this session owns everything
//! else: admission, heuristics, visit dedupe, and stale-result rejection.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use ng_core::config::{endpoint, endpoint_url};
use ng_core::engine::{Admission, NavigationPipeline};
use ng_core::reputation::{dedupe_key, ActiveRequests, InFlight, Operation, ReputationIndex};
use ng_core::types::{BadgeState, Generation, LoadStatus, NavigationEvent, TabId};
use ng_core::url::{parse_navigation, ParsedNavigation};
use ng_core::{ConfigError, Evaluation, GuardConfig, PageCommand, ParseFailure, Verdict};

/// What the background script must do after a navigation is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginResult {
    Ignored,
    Dropped { reason: String },
    /// Verdict reached from heuristics alone; badge already reconciled
    Safe {
        hostname: String,
        generation: Generation,
        badge: BadgeState,
        /// URL to record the visit at, if no record is in flight
        record_url: Option<String>,
    },
    /// Fetch `query_url` and pass the body to [`GuardSession::reconcile`]
    NeedsReputation {
        hostname: String,
        generation: Generation,
        flags: Vec<&'static str>,
        query_url: String,
        record_url: Option<String>,
    },
}

/// Result of reconciling a reputation index body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    Resolved {
        verdict: Verdict,
        badge: BadgeState,
        command: Option<PageCommand>,
    },
    Unresolved { error: String },
    Superseded,
}

/// An insert-history call handed to the background script.
struct Claim {
    _in_flight: InFlight,
    claimed_at_ms: f64,
}

pub struct GuardSession {
    pipeline: NavigationPipeline,
    active: ActiveRequests,
    claims: Mutex<HashMap<String, Claim>>,
}

impl GuardSession {
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: NavigationPipeline::new(config)?,
            active: ActiveRequests::new(),
            claims: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GuardConfig {
        self.pipeline.config()
    }

    /// Admit a tab update. `now_ms` is the caller's wall clock, used to
    /// expire record claims that were never released.
    pub fn begin(&self, tab_id: TabId, url: &str, status: &str, now_ms: f64) -> BeginResult {
        let event = NavigationEvent {
            tab_id,
            url: url.to_string(),
            status: LoadStatus::from_str(status),
        };

        let nav = match self.pipeline.begin(&event) {
            Admission::Ignored => return BeginResult::Ignored,
            Admission::Dropped(failure) => {
                return BeginResult::Dropped {
                    reason: failure.to_string(),
                }
            }
            Admission::Admitted(nav) => nav,
        };

        let record_url = self.claim_record(&nav.hostname, now_ms);

        if nav.evaluation.requires_confirmation() {
            return BeginResult::NeedsReputation {
                flags: nav.evaluation.describe(),
                query_url: endpoint_url(self.pipeline.service_base(), endpoint::QUERY, None).to_string(),
                hostname: nav.hostname,
                generation: nav.generation,
                record_url,
            };
        }

        let mut badge = None;
        self.pipeline
            .commit(tab_id, nav.generation, &nav.hostname, &Verdict::Safe, |b, _| {
                badge = Some(b.clone());
            });

        match badge {
            Some(badge) => BeginResult::Safe {
                hostname: nav.hostname,
                generation: nav.generation,
                badge,
                record_url,
            },
            // Only reachable if another admission raced this one
            None => {
                if record_url.is_some() {
                    self.release_record(&nav.hostname);
                }
                BeginResult::Ignored
            }
        }
    }

    /// Reconcile the body of a `/query` response for an admitted navigation.
    pub fn reconcile(&self, tab_id: TabId, generation: Generation, hostname: &str, body: &str) -> ReconcileResult {
        if !self.pipeline.generations().is_current(tab_id, generation) {
            return ReconcileResult::Superseded;
        }

        let index = match ReputationIndex::parse(body.as_bytes()) {
            Ok(index) => index,
            Err(e) => {
                log::warn!("Reputation check failed for {}: {}", hostname, e);
                return ReconcileResult::Unresolved { error: e.to_string() };
            }
        };

        let verdict = self.pipeline.verdict_from_index(hostname, &index);
        let mut writes = None;
        self.pipeline
            .commit(tab_id, generation, hostname, &verdict, |badge, command| {
                writes = Some((badge.clone(), command.cloned()));
            });

        match writes {
            Some((badge, command)) => ReconcileResult::Resolved {
                verdict,
                badge,
                command,
            },
            None => ReconcileResult::Superseded,
        }
    }

    /// Report a failed `/query` fetch. Never produces a verdict.
    pub fn reputation_failed(&self, hostname: &str, error: &str) -> ReconcileResult {
        log::warn!("Reputation check failed for {}: {}", hostname, error);
        ReconcileResult::Unresolved {
            error: error.to_string(),
        }
    }

    /// Claim the insert-history call for `hostname`. Returns the URL to
    /// fetch, or `None` if one is already in flight.
    ///
    /// The caller must pass the hostname to [`release_record`](Self::release_record)
    /// once the fetch settles. A claim that is never released expires after
    /// the configured request timeout, since no fetch can outlive it.
    pub fn claim_record(&self, hostname: &str, now_ms: f64) -> Option<String> {
        let key = dedupe_key(Operation::Insert, hostname);
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);

        let expired = claims
            .get(&key)
            .is_some_and(|claim| now_ms - claim.claimed_at_ms >= self.config().request_timeout_ms as f64);
        if expired {
            log::warn!("Insert history claim for {} was never released, expiring it", hostname);
            claims.remove(&key);
        }

        let Some(in_flight) = self.active.try_acquire(key.clone()) else {
            log::debug!("Insert history already in flight for {}", hostname);
            return None;
        };
        claims.insert(
            key,
            Claim {
                _in_flight: in_flight,
                claimed_at_ms: now_ms,
            },
        );
        Some(endpoint_url(self.pipeline.service_base(), endpoint::INSERT_HISTORY, Some(hostname)).to_string())
    }

    /// Release the insert-history claim for `hostname`, whatever the
    /// outcome of the call.
    pub fn release_record(&self, hostname: &str) {
        let key = dedupe_key(Operation::Insert, hostname);
        // Dropping the claim frees the key
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    pub fn record_in_flight(&self, hostname: &str) -> bool {
        self.active.contains(&dedupe_key(Operation::Insert, hostname))
    }

    pub fn forget_tab(&self, tab_id: TabId) {
        self.pipeline.forget_tab(tab_id);
    }

    /// Run the heuristics on `url` without touching any tab state.
    pub fn classify(&self, url: &str) -> Result<(ParsedNavigation, Evaluation), ParseFailure> {
        let parsed = parse_navigation(url, &self.config().internal_schemes)?;
        let evaluation = self.pipeline.rules().evaluate(&parsed);
        Ok((parsed, evaluation))
    }
}
