//! Replay a recorded stream of tab events through the verdict engine.
//!
//! Input is JSON lines, one `NavigationEvent` per line:
//! `{"tab_id":1,"url":"https://example.com","status":"complete"}`.
//! Blank lines and lines starting with `#` are skipped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};

use ng_core::reputation::RecordOutcome;
use ng_core::types::TabId;
use ng_core::{
    Admission, BadgeSurface, NavigationEvent, NavigationOutcome, PageMessenger, ReputationService, Verdict,
    VerdictEngine,
};

pub fn parse_events(text: &str) -> Result<Vec<NavigationEvent>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| format!("Line {}: invalid event: {}", idx + 1, e))
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub ignored: usize,
    pub dropped: usize,
    pub safe: usize,
    pub unsafe_: usize,
    pub unresolved: usize,
    pub superseded: usize,
    pub records_sent: usize,
    pub records_suppressed: usize,
    pub records_failed: usize,
}

impl ReplaySummary {
    fn tally(&mut self, outcome: &NavigationOutcome) {
        match outcome {
            NavigationOutcome::Ignored => self.ignored += 1,
            NavigationOutcome::Dropped(_) => self.dropped += 1,
            NavigationOutcome::Resolved { verdict: Verdict::Safe, .. } => self.safe += 1,
            NavigationOutcome::Resolved { verdict: Verdict::Unsafe { .. }, .. } => self.unsafe_ += 1,
            NavigationOutcome::Unresolved(_) => self.unresolved += 1,
            NavigationOutcome::Superseded => self.superseded += 1,
        }
    }

    fn tally_record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Sent => self.records_sent += 1,
            RecordOutcome::DuplicateSuppressed => self.records_suppressed += 1,
            RecordOutcome::Failed(_) => self.records_failed += 1,
        }
    }
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Replayed {} events", self.events)?;
        writeln!(f, "  Ignored:     {}", self.ignored)?;
        writeln!(f, "  Dropped:     {}", self.dropped)?;
        writeln!(f, "  Safe:        {}", self.safe)?;
        writeln!(f, "  Unsafe:      {}", self.unsafe_)?;
        writeln!(f, "  Unresolved:  {}", self.unresolved)?;
        writeln!(f, "  Superseded:  {}", self.superseded)?;
        write!(
            f,
            "  Records:     {} sent, {} suppressed, {} failed",
            self.records_sent, self.records_suppressed, self.records_failed
        )
    }
}

/// Run `events` through `engine`.
///
/// Events are admitted in order. Each admitted navigation resolves on its
/// own task; a newer navigation in the same tab aborts the older task.
/// Visit recording runs on separate tasks and is never aborted.
pub async fn replay<S, B, M>(engine: Arc<VerdictEngine<S, B, M>>, events: Vec<NavigationEvent>) -> ReplaySummary
where
    S: ReputationService + 'static,
    B: BadgeSurface + 'static,
    M: PageMessenger + 'static,
{
    let mut summary = ReplaySummary {
        events: events.len(),
        ..Default::default()
    };
    let mut running: HashMap<TabId, JoinHandle<NavigationOutcome>> = HashMap::new();
    let mut replaced: Vec<JoinHandle<NavigationOutcome>> = Vec::new();
    let mut records: JoinSet<RecordOutcome> = JoinSet::new();

    for event in events {
        let admission = engine.begin(&event);

        if admission_supersedes(&admission) {
            if let Some(previous) = running.remove(&event.tab_id) {
                previous.abort();
                replaced.push(previous);
            }
        }

        let nav = match admission {
            Admission::Ignored => {
                summary.ignored += 1;
                continue;
            }
            Admission::Dropped(_) => {
                summary.dropped += 1;
                continue;
            }
            Admission::Admitted(nav) => Arc::new(nav),
        };

        let record_engine = Arc::clone(&engine);
        let record_nav = Arc::clone(&nav);
        records.spawn(async move { record_engine.record(&record_nav).await });

        let resolve_engine = Arc::clone(&engine);
        let tab_id = nav.tab_id;
        running.insert(tab_id, tokio::spawn(async move { resolve_engine.resolve(&nav).await }));
    }

    for handle in replaced.into_iter().chain(running.into_values()) {
        match handle.await {
            Ok(outcome) => summary.tally(&outcome),
            Err(e) if e.is_cancelled() => summary.superseded += 1,
            Err(e) => log::error!("Navigation task failed: {}", e),
        }
    }

    while let Some(result) = records.join_next().await {
        match result {
            Ok(outcome) => summary.tally_record(&outcome),
            Err(e) => log::error!("Record task failed: {}", e),
        }
    }

    summary
}

/// Every completed load takes over its tab, classifiable or not.
fn admission_supersedes(admission: &Admission) -> bool {
    !matches!(admission, Admission::Ignored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use ng_core::reputation::BoxFuture;
    use ng_core::types::{BadgeColor, BadgeState};
    use ng_core::{GuardConfig, GuardError, PageCommand};

    struct SlowService {
        body: &'static str,
        inserts: AtomicUsize,
    }

    impl ReputationService for SlowService {
        fn insert_history<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            Box::pin(async move {
                self.inserts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }

        fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(self.body.as_bytes().to_vec())
            })
        }

        fn lookup<'a>(&'a self, _hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct Recorder {
        badges: Mutex<Vec<BadgeState>>,
        commands: Mutex<Vec<(TabId, PageCommand)>>,
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

    fn engine(body: &'static str) -> (Arc<VerdictEngine<SlowService, Arc<Recorder>, Arc<Recorder>>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let service = SlowService {
            body,
            inserts: AtomicUsize::new(0),
        };
        let engine =
            VerdictEngine::new(GuardConfig::default(), service, Arc::clone(&recorder), Arc::clone(&recorder)).unwrap();
        (Arc::new(engine), recorder)
    }

    #[test]
    fn test_parse_events() {
        let text = "# recorded session\n\
            {\"tab_id\":1,\"url\":\"https://a.com\",\"status\":\"loading\"}\n\
            \n\
            {\"tab_id\":1,\"url\":\"https://a.com\",\"status\":\"complete\"}\n";
        let events = parse_events(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], NavigationEvent::complete(1, "https://a.com"));

        let err = parse_events("{\"tab_id\":1}").unwrap_err();
        assert!(err.starts_with("Line 1:"));
    }

    #[tokio::test]
    async fn test_newer_navigation_supersedes_older() {
        let (engine, recorder) = engine(r#"{"domains":[]}"#);
        let events = vec![
            NavigationEvent::complete(1, "https://shop.com"),
            NavigationEvent::complete(1, "https://school.edu"),
        ];

        let summary = replay(Arc::clone(&engine), events).await;

        assert_eq!(summary.safe, 1);
        assert_eq!(summary.superseded, 1);
        assert_eq!(summary.unsafe_, 0);
        assert_eq!(summary.records_sent, 2);
        assert_eq!(engine.reputation().service().inserts.load(Ordering::SeqCst), 2);

        let badges = recorder.badges.lock().unwrap();
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].color, BadgeColor::Green);
        assert!(recorder.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tabs_resolve_independently() {
        let (engine, recorder) = engine(r#"{"domains":[{"domainname":"shop.com","indexed":true}]}"#);
        let events = vec![
            NavigationEvent::complete(1, "http://user@phish.biz"),
            NavigationEvent::complete(2, "https://www.shop.com"),
            NavigationEvent {
                tab_id: 3,
                url: "https://a.com".to_string(),
                status: ng_core::LoadStatus::Loading,
            },
            NavigationEvent::complete(4, "chrome://settings"),
        ];

        let summary = replay(engine, events).await;

        assert_eq!(summary.events, 4);
        assert_eq!(summary.unsafe_, 1);
        assert_eq!(summary.safe, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.dropped, 1);

        let commands = recorder.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, 1);
    }
}
