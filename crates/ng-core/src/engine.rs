//! Navigation Verdict Engine
//!
//! Every completed navigation moves through
//! `Pending -> HeuristicsEvaluated -> {AwaitingReputation | Resolved}`.
//!
//! Each admitted navigation is tagged with a generation. Badge writes and
//! page commands go through [`TabGenerations::commit_with`], which only lets
//! the tab's current generation write, so a slow reputation answer for an
//! earlier page can never overwrite the state of the page now in the tab.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::config::{endpoint, endpoint_url, GuardConfig};
use crate::error::{ConfigError, GuardError, ParseFailure};
use crate::overlay::PageCommand;
use crate::reputation::{RecordOutcome, ReputationClient, ReputationIndex, ReputationService};
use crate::rules::{Evaluation, RuleSet};
use crate::types::{BadgeState, Generation, LoadStatus, NavigationEvent, TabId, Verdict};
use crate::url::parse_navigation;

// =============================================================================
// Collaborator Ports
// =============================================================================

/// Extension icon badge.
///
/// Called from inside the tab's commit. An implementation may query the
/// engine or start navigations in other tabs, but must not admit a new
/// navigation for the same tab from within the call.
pub trait BadgeSurface: Send + Sync {
    fn set_badge(&self, badge: &BadgeState);
}

/// Delivers commands to the page lock overlay of a tab.
///
/// Same calling context as [`BadgeSurface::set_badge`].
pub trait PageMessenger: Send + Sync {
    fn send(&self, tab_id: TabId, command: &PageCommand);
}

impl<T: BadgeSurface + ?Sized> BadgeSurface for Arc<T> {
    fn set_badge(&self, badge: &BadgeState) {
        (**self).set_badge(badge)
    }
}

impl<T: PageMessenger + ?Sized> PageMessenger for Arc<T> {
    fn send(&self, tab_id: TabId, command: &PageCommand) {
        (**self).send(tab_id, command)
    }
}

// =============================================================================
// Generations
// =============================================================================

#[derive(Debug, Default)]
struct GenerationTable {
    next: Generation,
    current: HashMap<TabId, Generation>,
    writers: HashMap<TabId, Arc<Mutex<()>>>,
}

/// Current navigation generation per tab.
///
/// Generations come from one counter shared by all tabs, so a tab that is
/// forgotten and reused can never see an old generation again.
///
/// Writes for a tab are serialised by a per-tab writer lock. The shared
/// table is only locked for bookkeeping, never while a write runs, so a slow
/// write in one tab does not hold up other tabs. A write may read this table
/// and admit navigations in other tabs, but must not admit a navigation in
/// its own tab.
#[derive(Debug, Default)]
pub struct TabGenerations {
    inner: Mutex<GenerationTable>,
}

impl TabGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GenerationTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self, tab_id: TabId) -> Arc<Mutex<()>> {
        Arc::clone(self.lock().writers.entry(tab_id).or_default())
    }

    /// Start a new generation for `tab_id`, superseding any previous one.
    ///
    /// Waits for a write already running in the same tab to finish.
    pub fn advance(&self, tab_id: TabId) -> Generation {
        let writer = self.writer(tab_id);
        let _writing = writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut table = self.lock();
        table.next += 1;
        let generation = table.next;
        table.current.insert(tab_id, generation);
        generation
    }

    pub fn current(&self, tab_id: TabId) -> Option<Generation> {
        self.lock().current.get(&tab_id).copied()
    }

    pub fn is_current(&self, tab_id: TabId, generation: Generation) -> bool {
        self.current(tab_id) == Some(generation)
    }

    /// Run `write` only if `generation` is still current for `tab_id`.
    ///
    /// The tab's writer lock is held while `write` runs, so no newer
    /// generation can be admitted for this tab between the check and the
    /// write.
    pub fn commit_with<F: FnOnce()>(&self, tab_id: TabId, generation: Generation, write: F) -> bool {
        let writer = self.writer(tab_id);
        let _writing = writer.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.is_current(tab_id, generation) {
            return false;
        }
        write();
        true
    }

    /// Drop state for a closed tab.
    pub fn forget(&self, tab_id: TabId) {
        let mut table = self.lock();
        table.current.remove(&tab_id);
        table.writers.remove(&tab_id);
    }

    pub fn tab_count(&self) -> usize {
        self.lock().current.len()
    }
}

// =============================================================================
// Navigation
// =============================================================================

/// Per-navigation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationState {
    Pending,
    HeuristicsEvaluated,
    AwaitingReputation,
    Resolved(Verdict),
}

/// A navigation admitted into the pipeline.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub tab_id: TabId,
    pub generation: Generation,
    pub url: String,
    pub hostname: String,
    pub evaluation: Evaluation,
}

impl Navigation {
    /// State the navigation is in once its heuristics have run.
    pub fn state(&self) -> NavigationState {
        if self.evaluation.requires_confirmation() {
            NavigationState::AwaitingReputation
        } else {
            NavigationState::HeuristicsEvaluated
        }
    }
}

/// Result of offering an event to the engine.
#[derive(Debug)]
pub enum Admission {
    /// Not a completed load
    Ignored,
    /// URL could not be resolved; stays Pending
    Dropped(ParseFailure),
    Admitted(Navigation),
}

/// Final outcome of one navigation.
#[derive(Debug)]
pub enum NavigationOutcome {
    Ignored,
    Dropped(ParseFailure),
    Resolved {
        verdict: Verdict,
        /// Whether the reputation index was consulted
        via_reputation: bool,
    },
    /// Reputation could not be verified; badge and page left untouched
    Unresolved(GuardError),
    /// A newer navigation in the same tab took over
    Superseded,
}

impl NavigationOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Resolved { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    /// Terminal state of the navigation, if it reached one.
    pub fn state(&self) -> NavigationState {
        match self {
            Self::Resolved { verdict, .. } => NavigationState::Resolved(verdict.clone()),
            Self::Unresolved(_) | Self::Superseded => NavigationState::AwaitingReputation,
            Self::Ignored | Self::Dropped(_) => NavigationState::Pending,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Synchronous half of the engine: admission, heuristics, verdict from an
/// index, and the reconciliation point. Holds no transport, so hosts that
/// run the network calls themselves (the wasm background page) drive it
/// directly.
pub struct NavigationPipeline {
    config: GuardConfig,
    rules: RuleSet,
    service_base: Url,
    generations: TabGenerations,
}

impl NavigationPipeline {
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        let rules = config.rule_set()?;
        let service_base = config.service_base()?;
        Ok(Self {
            config,
            rules,
            service_base,
            generations: TabGenerations::new(),
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn service_base(&self) -> &Url {
        &self.service_base
    }

    pub fn generations(&self) -> &TabGenerations {
        &self.generations
    }

    /// Admit an event: filter to completed loads, claim a new generation
    /// for the tab, resolve the hostname and run the heuristics.
    pub fn begin(&self, event: &NavigationEvent) -> Admission {
        if event.status != LoadStatus::Complete {
            return Admission::Ignored;
        }

        // Any completed load supersedes what was in the tab, even one we
        // cannot classify.
        let generation = self.generations.advance(event.tab_id);

        let parsed = match parse_navigation(&event.url, &self.config.internal_schemes) {
            Ok(parsed) => parsed,
            Err(failure) => {
                match &failure {
                    ParseFailure::InternalPage(_) => log::debug!("Skipping tab {}: {}", event.tab_id, failure),
                    _ => log::warn!("Dropping navigation in tab {}: {}", event.tab_id, failure),
                }
                return Admission::Dropped(failure);
            }
        };

        let evaluation = self.rules.evaluate(&parsed);
        log::debug!(
            "Tab {} gen {} {}: heuristics {:?}",
            event.tab_id,
            generation,
            parsed.hostname,
            evaluation.describe()
        );

        Admission::Admitted(Navigation {
            tab_id: event.tab_id,
            generation,
            url: parsed.url,
            hostname: parsed.hostname,
            evaluation,
        })
    }

    /// Verdict for `hostname` given the reputation index.
    pub fn verdict_from_index(&self, hostname: &str, index: &ReputationIndex) -> Verdict {
        if index.is_indexed(hostname) {
            Verdict::Safe
        } else {
            Verdict::Unsafe {
                message: self.config.warning_message.clone(),
            }
        }
    }

    /// Page command that goes with a verdict.
    pub fn page_command(&self, hostname: &str, verdict: &Verdict) -> Option<PageCommand> {
        match verdict {
            Verdict::Safe => None,
            Verdict::Unsafe { message } => Some(PageCommand::warning(message, self.lookup_url(hostname))),
        }
    }

    /// The single reconciliation point for badge and page writes.
    ///
    /// `write` receives the badge and the optional page command and runs
    /// only if `generation` is still current for `tab_id`. Returns whether
    /// it ran.
    pub fn commit<F>(&self, tab_id: TabId, generation: Generation, hostname: &str, verdict: &Verdict, write: F) -> bool
    where
        F: FnOnce(&BadgeState, Option<&PageCommand>),
    {
        let badge = verdict.badge(tab_id);
        let command = self.page_command(hostname, verdict);

        let written = self
            .generations
            .commit_with(tab_id, generation, || write(&badge, command.as_ref()));

        if !written {
            log::debug!("Discarding stale verdict for {} in tab {} (gen {})", hostname, tab_id, generation);
            return false;
        }

        match verdict {
            Verdict::Safe => log::info!("Tab {}: {} is safe", tab_id, hostname),
            Verdict::Unsafe { .. } => log::info!("Tab {}: {} is not approved, page locked", tab_id, hostname),
        }
        true
    }

    /// Forget a closed tab.
    pub fn forget_tab(&self, tab_id: TabId) {
        self.generations.forget(tab_id);
    }

    /// In-depth check URL for `hostname`, when the banner offers one.
    pub fn lookup_url(&self, hostname: &str) -> Option<String> {
        self.config
            .offer_check_link
            .then(|| endpoint_url(&self.service_base, endpoint::LOOKUP, Some(hostname)).to_string())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The navigation verdict engine: the pipeline plus the reputation client
/// and the badge / page collaborators.
pub struct VerdictEngine<S, B, M> {
    pipeline: NavigationPipeline,
    reputation: ReputationClient<S>,
    badge: B,
    messenger: M,
}

impl<S, B, M> VerdictEngine<S, B, M>
where
    S: ReputationService,
    B: BadgeSurface,
    M: PageMessenger,
{
    pub fn new(config: GuardConfig, service: S, badge: B, messenger: M) -> Result<Self, ConfigError> {
        Self::with_client(config, ReputationClient::new(service), badge, messenger)
    }

    /// Use an explicitly constructed reputation client.
    pub fn with_client(
        config: GuardConfig,
        reputation: ReputationClient<S>,
        badge: B,
        messenger: M,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: NavigationPipeline::new(config)?,
            reputation,
            badge,
            messenger,
        })
    }

    pub fn pipeline(&self) -> &NavigationPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &GuardConfig {
        self.pipeline.config()
    }

    pub fn reputation(&self) -> &ReputationClient<S> {
        &self.reputation
    }

    pub fn generations(&self) -> &TabGenerations {
        self.pipeline.generations()
    }

    pub fn begin(&self, event: &NavigationEvent) -> Admission {
        self.pipeline.begin(event)
    }

    /// Record the visit with the reputation service. Independent of the
    /// verdict; deduplicated per hostname.
    pub async fn record(&self, nav: &Navigation) -> RecordOutcome {
        self.reputation.record_visit(&nav.hostname).await
    }

    /// Drive an admitted navigation to its verdict.
    pub async fn resolve(&self, nav: &Navigation) -> NavigationOutcome {
        if !nav.evaluation.requires_confirmation() {
            return self.commit(nav, Verdict::Safe, false);
        }

        if !self.generations().is_current(nav.tab_id, nav.generation) {
            return NavigationOutcome::Superseded;
        }

        log::debug!("Tab {} gen {} {}: awaiting reputation", nav.tab_id, nav.generation, nav.hostname);
        let index = match self.reputation.query_index_status().await {
            Ok(index) => index,
            Err(e) => {
                log::warn!("Reputation check failed for {}: {}", nav.hostname, e);
                return NavigationOutcome::Unresolved(e);
            }
        };

        let verdict = self.pipeline.verdict_from_index(&nav.hostname, &index);
        self.commit(nav, verdict, true)
    }

    /// Admit, record and resolve one event. Recording and resolution run
    /// concurrently.
    pub async fn handle(&self, event: &NavigationEvent) -> NavigationOutcome {
        match self.begin(event) {
            Admission::Ignored => NavigationOutcome::Ignored,
            Admission::Dropped(failure) => NavigationOutcome::Dropped(failure),
            Admission::Admitted(nav) => {
                let (_, outcome) = futures::join!(self.record(&nav), self.resolve(&nav));
                outcome
            }
        }
    }

    /// Request an in-depth check of `hostname`.
    pub async fn check_in_depth(&self, hostname: &str) -> RecordOutcome {
        self.reputation.lookup(hostname).await
    }

    /// Forget a closed tab.
    pub fn forget_tab(&self, tab_id: TabId) {
        self.pipeline.forget_tab(tab_id);
    }

    fn commit(&self, nav: &Navigation, verdict: Verdict, via_reputation: bool) -> NavigationOutcome {
        let written = self
            .pipeline
            .commit(nav.tab_id, nav.generation, &nav.hostname, &verdict, |badge, command| {
                self.badge.set_badge(badge);
                if let Some(command) = command {
                    self.messenger.send(nav.tab_id, command);
                }
            });

        if !written {
            return NavigationOutcome::Superseded;
        }
        NavigationOutcome::Resolved {
            verdict,
            via_reputation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::channel::oneshot;

    use crate::overlay::CheckLink;
    use crate::reputation::BoxFuture;
    use crate::types::BadgeColor;

    #[derive(Default)]
    struct FakeService {
        index_body: Mutex<Vec<u8>>,
        query_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        fail_query: bool,
        inserts: AtomicUsize,
        queries: AtomicUsize,
        lookups: AtomicUsize,
    }

    impl FakeService {
        fn with_index(body: &str) -> Self {
            Self {
                index_body: Mutex::new(body.as_bytes().to_vec()),
                ..Self::default()
            }
        }

        fn gate_next_query(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.query_gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    impl ReputationService for FakeService {
        fn insert_history<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let gate = self.query_gates.lock().unwrap().pop_front();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                if self.fail_query {
                    return Err(GuardError::Network("connection refused".to_string()));
                }
                Ok(self.index_body.lock().unwrap().clone())
            })
        }

        fn lookup<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct Recorder {
        badges: Mutex<Vec<BadgeState>>,
        commands: Mutex<Vec<(TabId, PageCommand)>>,
    }

    impl Recorder {
        fn badges(&self) -> Vec<BadgeState> {
            self.badges.lock().unwrap().clone()
        }

        fn commands(&self) -> Vec<(TabId, PageCommand)> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl BadgeSurface for Recorder {
        fn set_badge(&self, badge: &BadgeState) {
            self.badges.lock().unwrap().push(badge.clone());
        }
    }

    impl PageMessenger for Recorder {
        fn send(&self, tab_id: TabId, command: &PageCommand) {
            self.commands.lock().unwrap().push((tab_id, command.clone()));
        }
    }

    type TestEngine = VerdictEngine<Arc<FakeService>, Arc<Recorder>, Arc<Recorder>>;

    fn engine_with(service: FakeService, config: GuardConfig) -> (TestEngine, Arc<FakeService>, Arc<Recorder>) {
        let service = Arc::new(service);
        let recorder = Arc::new(Recorder::default());
        let engine = VerdictEngine::new(config, service.clone(), recorder.clone(), recorder.clone()).unwrap();
        (engine, service, recorder)
    }

    fn engine(service: FakeService) -> (TestEngine, Arc<FakeService>, Arc<Recorder>) {
        engine_with(service, GuardConfig::default())
    }

    fn red(tab_id: TabId) -> BadgeState {
        BadgeState::new(tab_id, BadgeColor::Red)
    }

    fn green(tab_id: TabId) -> BadgeState {
        BadgeState::new(tab_id, BadgeColor::Green)
    }

    #[tokio::test]
    async fn test_recognised_https_is_safe_without_query() {
        let (engine, service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let outcome = engine.handle(&NavigationEvent::complete(1, "https://school.edu.sg")).await;

        assert!(matches!(
            outcome,
            NavigationOutcome::Resolved { verdict: Verdict::Safe, via_reputation: false }
        ));
        assert_eq!(recorder.badges(), vec![green(1)]);
        assert!(recorder.commands().is_empty());
        assert_eq!(service.queries.load(Ordering::SeqCst), 0);
        assert_eq!(service.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_phishing_url_locks_page() {
        let (engine, service, recorder) = engine(FakeService::with_index(
            r#"{"domains":[{"domainname":"school.edu.sg","indexed":true}]}"#,
        ));

        let outcome = engine.handle(&NavigationEvent::complete(4, "http://user@phish.biz")).await;

        assert!(matches!(
            outcome,
            NavigationOutcome::Resolved { verdict: Verdict::Unsafe { .. }, via_reputation: true }
        ));
        assert_eq!(recorder.badges(), vec![red(4)]);
        let commands = recorder.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, 4);
        assert!(matches!(
            &commands[0].1,
            PageCommand::WarnUser { message, check_link: None } if message == crate::config::DEFAULT_WARNING
        ));
        assert_eq!(service.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_whitelisted_without_index_entry_is_unsafe() {
        let (engine, _service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let outcome = engine.handle(&NavigationEvent::complete(2, "https://shop.com")).await;

        assert!(matches!(outcome.verdict(), Some(Verdict::Unsafe { .. })));
        assert_eq!(recorder.badges(), vec![red(2)]);
        assert_eq!(recorder.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_indexed_www_host_is_confirmed_safe() {
        let (engine, _service, recorder) = engine(FakeService::with_index(
            r#"{"domains":[{"domainname":"Shop.com","indexed":true}]}"#,
        ));

        let outcome = engine.handle(&NavigationEvent::complete(2, "https://www.shop.com/cart")).await;

        assert!(matches!(
            outcome,
            NavigationOutcome::Resolved { verdict: Verdict::Safe, via_reputation: true }
        ));
        assert_eq!(recorder.badges(), vec![green(2)]);
        assert!(recorder.commands().is_empty());
    }

    #[tokio::test]
    async fn test_unindexed_entry_does_not_confirm() {
        let (engine, _service, recorder) = engine(FakeService::with_index(
            r#"{"domains":[{"domainname":"shop.com","indexed":false}]}"#,
        ));

        engine.handle(&NavigationEvent::complete(2, "https://shop.com")).await;

        assert_eq!(recorder.badges(), vec![red(2)]);
    }

    #[tokio::test]
    async fn test_malformed_response_leaves_badge_unchanged() {
        let (engine, _service, recorder) = engine(FakeService::with_index("{}"));

        engine.handle(&NavigationEvent::complete(3, "https://portal.gov.sg")).await;
        let outcome = engine.handle(&NavigationEvent::complete(3, "https://shop.com")).await;

        assert!(matches!(outcome, NavigationOutcome::Unresolved(GuardError::Schema(_))));
        assert_eq!(outcome.state(), NavigationState::AwaitingReputation);
        assert_eq!(recorder.badges(), vec![green(3)]);
        assert!(recorder.commands().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_is_never_safe() {
        let service = FakeService {
            fail_query: true,
            ..FakeService::default()
        };
        let (engine, _service, recorder) = engine(service);

        let outcome = engine.handle(&NavigationEvent::complete(1, "http://phish.biz")).await;

        assert!(matches!(outcome, NavigationOutcome::Unresolved(GuardError::Network(_))));
        assert!(recorder.badges().is_empty());
        assert!(recorder.commands().is_empty());
    }

    #[tokio::test]
    async fn test_ignored_and_dropped_events() {
        let (engine, service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let loading = NavigationEvent {
            status: LoadStatus::Loading,
            ..NavigationEvent::complete(1, "https://shop.com")
        };
        assert!(matches!(engine.handle(&loading).await, NavigationOutcome::Ignored));
        assert!(matches!(
            engine.handle(&NavigationEvent::complete(1, "chrome://newtab")).await,
            NavigationOutcome::Dropped(ParseFailure::InternalPage(_))
        ));
        assert!(matches!(
            engine.handle(&NavigationEvent::complete(1, "http://")).await,
            NavigationOutcome::Dropped(_)
        ));

        assert!(recorder.badges().is_empty());
        assert_eq!(service.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(service.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_unsafe_result_never_overwrites_newer_navigation() {
        let (engine, service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));
        let release = service.gate_next_query();

        let Admission::Admitted(first) = engine.begin(&NavigationEvent::complete(9, "http://phish.biz")) else {
            panic!("expected admission");
        };
        assert_eq!(first.state(), NavigationState::AwaitingReputation);
        let engine_ref = &engine;
        let second = async move {
            let outcome = engine_ref.handle(&NavigationEvent::complete(9, "https://school.edu.sg")).await;
            release.send(()).unwrap();
            outcome
        };

        let (first_outcome, second_outcome) = futures::join!(engine.resolve(&first), second);

        assert!(matches!(first_outcome, NavigationOutcome::Superseded));
        assert!(matches!(second_outcome.verdict(), Some(Verdict::Safe)));
        assert_eq!(recorder.badges(), vec![green(9)]);
        assert!(recorder.commands().is_empty());
    }

    #[tokio::test]
    async fn test_stale_result_after_internal_page() {
        let (engine, _service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let Admission::Admitted(first) = engine.begin(&NavigationEvent::complete(5, "https://shop.com")) else {
            panic!("expected admission");
        };
        engine.begin(&NavigationEvent::complete(5, "chrome://settings"));

        assert!(matches!(engine.resolve(&first).await, NavigationOutcome::Superseded));
        assert!(recorder.badges().is_empty());
    }

    #[tokio::test]
    async fn test_tabs_are_independent() {
        let (engine, _service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let Admission::Admitted(a) = engine.begin(&NavigationEvent::complete(1, "https://shop.com")) else {
            panic!("expected admission");
        };
        engine.handle(&NavigationEvent::complete(2, "https://school.edu")).await;
        engine.resolve(&a).await;

        assert_eq!(recorder.badges(), vec![green(2), red(1)]);
    }

    #[tokio::test]
    async fn test_forget_tab_and_reuse() {
        let (engine, _service, recorder) = engine(FakeService::with_index(r#"{"domains":[]}"#));

        let Admission::Admitted(old) = engine.begin(&NavigationEvent::complete(7, "https://shop.com")) else {
            panic!("expected admission");
        };
        engine.forget_tab(7);
        assert_eq!(engine.generations().tab_count(), 0);
        engine.handle(&NavigationEvent::complete(7, "https://school.edu")).await;

        assert!(matches!(engine.resolve(&old).await, NavigationOutcome::Superseded));
        assert_eq!(recorder.badges(), vec![green(7)]);
    }

    #[tokio::test]
    async fn test_check_link_offered() {
        let config = GuardConfig {
            offer_check_link: true,
            service_url: "https://rep.example".to_string(),
            ..GuardConfig::default()
        };
        let (engine, service, recorder) = engine_with(FakeService::with_index(r#"{"domains":[]}"#), config);

        engine.handle(&NavigationEvent::complete(1, "https://phish.biz")).await;

        let commands = recorder.commands();
        assert!(matches!(
            &commands[0].1,
            PageCommand::WarnUser { check_link: Some(CheckLink { lookup_url, .. }), .. }
                if lookup_url == "https://rep.example/lookup?domainName=phish.biz"
        ));

        assert!(matches!(engine.check_in_depth("phish.biz").await, RecordOutcome::Sent));
        assert_eq!(service.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lenient_whitelist_policy() {
        let config = GuardConfig {
            confirm_whitelisted: false,
            ..GuardConfig::default()
        };
        let (engine, service, recorder) = engine_with(FakeService::with_index(r#"{"domains":[]}"#), config);

        let outcome = engine.handle(&NavigationEvent::complete(1, "https://shop.com")).await;

        assert!(matches!(
            outcome,
            NavigationOutcome::Resolved { verdict: Verdict::Safe, via_reputation: false }
        ));
        assert_eq!(recorder.badges(), vec![green(1)]);
        assert_eq!(service.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generations_are_unique_across_tabs() {
        let generations = TabGenerations::new();
        let a = generations.advance(1);
        let b = generations.advance(2);
        let c = generations.advance(1);
        assert!(a < b && b < c);
        assert!(!generations.is_current(1, a));
        assert!(generations.is_current(1, c));
        assert!(!generations.commit_with(1, a, || panic!("stale write")));
        let mut wrote = false;
        assert!(generations.commit_with(2, b, || wrote = true));
        assert!(wrote);
    }

    #[test]
    fn test_commit_write_may_read_generations() {
        let generations = Arc::new(TabGenerations::new());
        let g1 = generations.advance(1);
        let (tx, rx) = std::sync::mpsc::channel();

        let inner = Arc::clone(&generations);
        std::thread::spawn(move || {
            let written = inner.commit_with(1, g1, || {
                assert_eq!(inner.current(1), Some(g1));
                let g2 = inner.advance(2);
                assert!(inner.is_current(2, g2));
                inner.forget(3);
            });
            let _ = tx.send(written);
        });

        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(2)), Ok(true));
    }

    #[test]
    fn test_slow_write_blocks_only_its_own_tab() {
        let generations = Arc::new(TabGenerations::new());
        let g1 = generations.advance(1);
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let writer = Arc::clone(&generations);
        let handle = std::thread::spawn(move || {
            writer.commit_with(1, g1, || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        });
        started_rx.recv().unwrap();

        // Another tab is admitted while tab 1 is still writing
        let other = generations.advance(2);
        assert!(generations.is_current(2, other));
        assert_eq!(generations.current(1), Some(g1));

        // Same tab waits for the write to finish
        let (admitted_tx, admitted_rx) = std::sync::mpsc::channel();
        let same = Arc::clone(&generations);
        let admit = std::thread::spawn(move || {
            let g = same.advance(1);
            admitted_tx.send(g).unwrap();
        });
        assert!(admitted_rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        assert!(handle.join().unwrap());
        let g3 = admitted_rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        admit.join().unwrap();
        assert!(generations.is_current(1, g3));
        assert!(!generations.commit_with(1, g1, || panic!("stale write")));
    }
}
