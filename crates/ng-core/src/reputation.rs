//! Reputation client
//!
//! The reputation service is an external HTTP API that records visits and
//! publishes an index of `{domainname, indexed}` entries. This module holds
//! the port the engine talks to, the in-flight dedupe set, and the index
//! parser. Transport lives behind [`ReputationService`].

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

use crate::error::GuardError;
use crate::url::strip_www;

/// Boxed future returned by [`ReputationService`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Secondary port for the external reputation service.
///
/// Uses `Pin<Box<dyn Future>>` return types so the trait stays
/// dyn-compatible and can be shared as `Arc<dyn ReputationService>`.
pub trait ReputationService: Send + Sync {
    /// Record a visit to `hostname`. The response body is not validated.
    fn insert_history<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>>;

    /// Fetch the raw body of the full reputation index.
    fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>>;

    /// Ask the service for an in-depth check of `hostname`.
    fn lookup<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>>;
}

impl<T: ReputationService + ?Sized> ReputationService for Arc<T> {
    fn insert_history<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
        (**self).insert_history(hostname)
    }

    fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>> {
        (**self).query_index()
    }

    fn lookup<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
        (**self).lookup(hostname)
    }
}

// =============================================================================
// Dedupe Set
// =============================================================================

/// Operations that are deduplicated per hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Lookup,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Lookup => "lookup",
        }
    }
}

/// Dedupe key for an operation on a hostname, e.g. `insert-example.com`.
pub fn dedupe_key(op: Operation, hostname: &str) -> String {
    format!("{}-{}", op.as_str(), hostname)
}

/// Set of in-flight outbound calls, keyed by operation and hostname.
///
/// Owned by a [`ReputationClient`]; clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct ActiveRequests {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds plain strings; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key`. Returns `None` if a call for it is already in flight.
    pub fn try_acquire(&self, key: String) -> Option<InFlight> {
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlight {
            set: self.clone(),
            key,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim on a dedupe key. The key is released on drop, whether the call
/// succeeded, failed, or its future was cancelled.
#[derive(Debug)]
pub struct InFlight {
    set: ActiveRequests,
    key: String,
}

impl InFlight {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

// =============================================================================
// Reputation Index
// =============================================================================

/// One entry of the reputation index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexEntry {
    pub domainname: String,
    pub indexed: bool,
}

/// Parsed reputation index.
#[derive(Debug, Clone, Default)]
pub struct ReputationIndex {
    indexed: HashSet<String>,
    entry_count: usize,
    skipped: usize,
}

impl ReputationIndex {
    /// Parse a `{ "domains": [ {domainname, indexed}, ... ] }` body.
    ///
    /// A missing or non-sequence `domains` field is a schema failure.
    /// Individual malformed entries are skipped.
    pub fn parse(body: &[u8]) -> Result<Self, GuardError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let domains = value
            .get("domains")
            .ok_or_else(|| GuardError::Schema("missing `domains` field".to_string()))?
            .as_array()
            .ok_or_else(|| GuardError::Schema("`domains` is not a sequence".to_string()))?;

        let mut index = Self::default();
        for item in domains {
            match IndexEntry::deserialize(item) {
                Ok(entry) => index.insert(entry),
                Err(e) => {
                    log::warn!("Skipping malformed index entry {}: {}", item, e);
                    index.skipped += 1;
                }
            }
        }
        Ok(index)
    }

    /// Build an index from entries.
    pub fn from_entries<I: IntoIterator<Item = IndexEntry>>(entries: I) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    fn insert(&mut self, entry: IndexEntry) {
        self.entry_count += 1;
        if entry.indexed {
            self.indexed.insert(entry.domainname.to_ascii_lowercase());
        }
    }

    /// Whether `hostname` (after stripping `www.`, case-insensitive) has an
    /// entry with `indexed == true`.
    pub fn is_indexed(&self, hostname: &str) -> bool {
        let clean = strip_www(hostname).to_ascii_lowercase();
        self.indexed.contains(&clean)
    }

    /// Entries parsed, indexed or not.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Entries with `indexed == true`.
    pub fn indexed_count(&self) -> usize {
        self.indexed.len()
    }

    /// Entries dropped as malformed.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    /// Indexed domains, sorted.
    pub fn indexed_domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.indexed.iter().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }
}

// =============================================================================
// Client
// =============================================================================

/// Result of a `record_visit` call.
#[derive(Debug)]
pub enum RecordOutcome {
    Sent,
    Failed(GuardError),
    /// A call for this hostname was already in flight
    DuplicateSuppressed,
}

/// Reputation client wrapping a service with an owned dedupe set.
pub struct ReputationClient<S> {
    service: S,
    active: ActiveRequests,
}

impl<S: ReputationService> ReputationClient<S> {
    pub fn new(service: S) -> Self {
        Self::with_active_requests(service, ActiveRequests::new())
    }

    /// Use an explicitly provided dedupe set.
    pub fn with_active_requests(service: S, active: ActiveRequests) -> Self {
        Self { service, active }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn active_requests(&self) -> &ActiveRequests {
        &self.active
    }

    /// Record a visit, at most one call in flight per hostname.
    pub async fn record_visit(&self, hostname: &str) -> RecordOutcome {
        let Some(_claim) = self.active.try_acquire(dedupe_key(Operation::Insert, hostname)) else {
            log::debug!("Insert history already in flight for {}", hostname);
            return RecordOutcome::DuplicateSuppressed;
        };

        match self.service.insert_history(hostname).await {
            Ok(()) => {
                log::debug!("Insert history success: {}", hostname);
                RecordOutcome::Sent
            }
            Err(e) => {
                log::warn!("Insert history request failed for {}: {}", hostname, e);
                RecordOutcome::Failed(e)
            }
        }
    }

    /// Fetch and validate the current reputation index.
    pub async fn query_index_status(&self) -> Result<ReputationIndex, GuardError> {
        let body = self.service.query_index().await?;
        ReputationIndex::parse(&body)
    }

    /// Fire an in-depth check for `hostname`, deduplicated like visits.
    pub async fn lookup(&self, hostname: &str) -> RecordOutcome {
        let Some(_claim) = self.active.try_acquire(dedupe_key(Operation::Lookup, hostname)) else {
            return RecordOutcome::DuplicateSuppressed;
        };

        match self.service.lookup(hostname).await {
            Ok(()) => RecordOutcome::Sent,
            Err(e) => {
                log::warn!("Lookup request failed for {}: {}", hostname, e);
                RecordOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::channel::oneshot;

    /// Service whose insert calls block until released.
    struct GatedService {
        inserts: AtomicUsize,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        fail: bool,
    }

    impl GatedService {
        fn new(gate: Option<oneshot::Receiver<()>>, fail: bool) -> Self {
            Self {
                inserts: AtomicUsize::new(0),
                gate: Mutex::new(gate),
                fail,
            }
        }
    }

    impl ReputationService for GatedService {
        fn insert_history<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                if self.fail {
                    Err(GuardError::Status(500))
                } else {
                    Ok(())
                }
            })
        }

        fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>> {
            Box::pin(async { Ok(br#"{"domains":[]}"#.to_vec()) })
        }

        fn lookup<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_strip_and_case_fold_on_match() {
        let index = ReputationIndex::parse(
            br#"{"domains":[{"domainname":"Example.EDU","indexed":true},{"domainname":"other.com","indexed":false}]}"#,
        )
        .unwrap();
        assert!(index.is_indexed("www.example.edu"));
        assert!(index.is_indexed("WWW.EXAMPLE.EDU"));
        assert!(index.is_indexed("example.edu"));
        assert!(!index.is_indexed("other.com"));
        assert!(!index.is_indexed("sub.example.edu"));
        assert_eq!(index.entry_count(), 2);
        assert_eq!(index.indexed_count(), 1);
    }

    #[test]
    fn test_schema_failures() {
        assert!(matches!(ReputationIndex::parse(b"{}"), Err(GuardError::Schema(_))));
        assert!(matches!(
            ReputationIndex::parse(br#"{"domains":{"a":1}}"#),
            Err(GuardError::Schema(_))
        ));
        assert!(matches!(ReputationIndex::parse(b"not json"), Err(GuardError::Decode(_))));
        assert!(matches!(ReputationIndex::parse(b"[]"), Err(GuardError::Schema(_))));
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let index = ReputationIndex::parse(
            br#"{"domains":[{"domainname":"a.com"},{"indexed":true},{"domainname":"b.com","indexed":true}]}"#,
        )
        .unwrap();
        assert_eq!(index.skipped_count(), 2);
        assert_eq!(index.indexed_domains(), vec!["b.com"]);
    }

    #[test]
    fn test_in_flight_released_on_drop() {
        let active = ActiveRequests::new();
        let claim = active.try_acquire(dedupe_key(Operation::Insert, "a.com")).unwrap();
        assert_eq!(claim.key(), "insert-a.com");
        assert!(active.try_acquire("insert-a.com".to_string()).is_none());
        // Different operation, different key
        assert!(active.try_acquire(dedupe_key(Operation::Lookup, "a.com")).is_some());
        drop(claim);
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_record_visit_sends_once() {
        let (release, gate) = oneshot::channel();
        let client = ReputationClient::new(GatedService::new(Some(gate), false));
        let client_ref = &client;

        let first = client.record_visit("a.com");
        let second = async move {
            // Runs while the first call is parked on the gate
            let outcome = client_ref.record_visit("a.com").await;
            release.send(()).unwrap();
            outcome
        };
        let (first, second) = futures::join!(first, second);

        assert!(matches!(first, RecordOutcome::Sent));
        assert!(matches!(second, RecordOutcome::DuplicateSuppressed));
        assert_eq!(client.service().inserts.load(Ordering::SeqCst), 1);
        assert!(client.active_requests().is_empty());
    }

    #[tokio::test]
    async fn test_dedupe_released_after_failure() {
        let client = ReputationClient::new(GatedService::new(None, true));
        assert!(matches!(
            client.record_visit("a.com").await,
            RecordOutcome::Failed(GuardError::Status(500))
        ));
        assert!(client.active_requests().is_empty());
        client.record_visit("a.com").await;
        assert_eq!(client.service().inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_index_status() {
        let client = ReputationClient::new(GatedService::new(None, false));
        let index = client.query_index_status().await.unwrap();
        assert_eq!(index.entry_count(), 0);
    }
}
