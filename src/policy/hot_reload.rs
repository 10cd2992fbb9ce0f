use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::observability::MetricsRegistry;
use crate::rules::RuleSnapshot;

use super::loader::{LoadError, RuleLoader};

/// Shortest interval between source checks.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Reload counters and the most recent rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadStats {
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Holds the published rule snapshot.
///
/// Readers take an `Arc` to the current snapshot without locking; a reload
/// compiles the new snapshot off to the side and publishes it with one
/// pointer swap, so no reader ever sees a partially built rule set.
pub struct RuleStore {
    current: ArcSwap<RuleSnapshot>,
    successes: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl RuleStore {
    /// Create a store publishing the given snapshot.
    pub fn new(initial: RuleSnapshot) -> Self {
        RuleStore {
            current: ArcSwap::from_pointee(initial),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_error: Mutex::new(None),
            metrics: None,
        }
    }

    /// Attach a metrics registry for reload counters.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create a store from the loader's source.
    ///
    /// An unreadable or invalid initial source leaves the store on an empty
    /// snapshot; the watcher keeps retrying.
    pub fn open(loader: &RuleLoader, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        let mut store = RuleStore::new(RuleSnapshot::empty());
        store.metrics = metrics;

        match store.reload(loader) {
            Ok(snapshot) => info!(
                version = %snapshot.label(),
                rules = snapshot.len(),
                "Loaded initial rule set"
            ),
            Err(e) => error!(
                path = %loader.path().display(),
                error = %e,
                "Failed to load initial rule set, starting empty"
            ),
        }

        store
    }

    /// The current snapshot. Never blocks, never returns a partial set.
    #[inline]
    pub fn current(&self) -> Arc<RuleSnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the published snapshot.
    pub fn publish(&self, snapshot: RuleSnapshot) -> Arc<RuleSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        snapshot
    }

    /// Load the source and publish it if the whole batch compiles.
    ///
    /// On failure the previous snapshot stays authoritative and the error is
    /// counted and returned.
    pub fn reload(&self, loader: &RuleLoader) -> Result<Arc<RuleSnapshot>, LoadError> {
        match loader.load() {
            Ok(snapshot) => {
                let published = self.publish(snapshot);
                self.successes.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = None;
                if let Some(metrics) = &self.metrics {
                    metrics.record_rule_reload(true);
                }
                Ok(published)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Count a rejected reload.
    pub(crate) fn record_failure(&self, err: &LoadError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
        if let Some(metrics) = &self.metrics {
            metrics.record_rule_reload(false);
        }
    }

    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Watch the rule source and publish new snapshots when it changes.
pub struct RuleWatcher {
    loader: RuleLoader,
    store: Arc<RuleStore>,
    check_interval: Duration,
    last_rejected: Option<String>,
}

impl RuleWatcher {
    /// Create a new rule watcher. Intervals below [`MIN_CHECK_INTERVAL`]
    /// are raised to it.
    pub fn new(loader: RuleLoader, store: Arc<RuleStore>, check_interval: Duration) -> Self {
        RuleWatcher {
            loader,
            store,
            check_interval: check_interval.max(MIN_CHECK_INTERVAL),
            last_rejected: None,
        }
    }

    /// Start watching for rule changes on a background task.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.check_for_updates() {
                    Ok(true) => info!(
                        version = %self.store.current().label(),
                        "Rule set reloaded"
                    ),
                    Ok(false) => {} // No changes
                    Err(e) => warn!(
                        path = %self.loader.path().display(),
                        error = %e,
                        "Rejected rule reload, keeping previous rule set"
                    ),
                }
            }
        })
    }

    /// Reload if the source fingerprint differs from the published one.
    ///
    /// A source that was already rejected is not retried until it changes.
    fn check_for_updates(&mut self) -> Result<bool, LoadError> {
        let fingerprint = match self.loader.current_fingerprint() {
            Ok(fp) => fp,
            Err(e) => {
                self.store.record_failure(&e);
                return Err(e);
            }
        };

        if fingerprint == self.store.current().fingerprint
            || self.last_rejected.as_deref() == Some(fingerprint.as_str())
        {
            return Ok(false);
        }

        match self.store.reload(&self.loader) {
            Ok(_) => {
                self.last_rejected = None;
                Ok(true)
            }
            Err(e) => {
                self.last_rejected = Some(fingerprint);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerRegistry;
    use crate::domain::{Action, EvaluationRequest, RuleDef, RuleDocument};
    use crate::engine::{DecisionEngine, EngineContext};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const V1: &str = r#"
version: "v1"
rules:
  - id: SSN-1.0
    pattern: '\b\d{3}-\d{2}-\d{4}\b'
    action: block
"#;

    const V2: &str = r#"
version: "v2"
rules:
  - id: SSN-1.0
    pattern: '\b\d{3}-\d{2}-\d{4}\b'
    action: flag
  - id: EMAIL-1.0
    pattern: '[\w.+-]+@[\w-]+\.[\w.]+'
    action: flag
"#;

    fn rules_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_open_loads_initial_rules() {
        let file = rules_file(V1);
        let store = RuleStore::open(&RuleLoader::new(file.path()), None);

        let snapshot = store.current();
        assert_eq!(snapshot.version.as_deref(), Some("v1"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.stats().successes, 1);
    }

    #[test]
    fn test_open_with_invalid_source_starts_empty() {
        let file = rules_file("rules:\n  - id: R1\n    pattern: '['\n    action: block\n");
        let store = RuleStore::open(&RuleLoader::new(file.path()), None);

        assert!(store.current().is_empty());
        assert_eq!(store.stats().failures, 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let file = rules_file(V1);
        let loader = RuleLoader::new(file.path());
        let metrics = Arc::new(MetricsRegistry::new());
        let store = RuleStore::open(&loader, Some(metrics.clone()));

        std::fs::write(
            file.path(),
            concat!(
                "rules:\n",
                "  - id: GOOD\n    pattern: ok\n    action: flag\n",
                "  - id: BAD\n    pattern: '(x'\n    action: block\n",
            ),
        )
        .unwrap();

        assert!(store.reload(&loader).is_err());

        let snapshot = store.current();
        assert_eq!(snapshot.version.as_deref(), Some("v1"));
        assert!(snapshot.get("GOOD").is_none());

        let stats = store.stats();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.unwrap().contains("BAD"));
        assert_eq!(metrics.rule_reload_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_held_snapshot_survives_publish() {
        let store = RuleStore::new(RuleSnapshot::empty());
        let held = store.current();

        let doc = RuleDocument {
            version: Some("next".to_string()),
            rules: vec![RuleDef::pattern("R1", "x", Action::Block)],
            suppressions: Vec::new(),
        };
        store.publish(RuleSnapshot::compile(&doc, "fp".to_string()).unwrap());

        assert!(held.is_empty());
        assert_eq!(store.current().len(), 1);
    }

    #[tokio::test]
    async fn test_watcher_detects_changes() {
        let file = rules_file(V1);
        let loader = RuleLoader::new(file.path());
        let store = Arc::new(RuleStore::open(&loader, None));

        let handle =
            RuleWatcher::new(loader, store.clone(), Duration::from_millis(20)).start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        std::fs::write(file.path(), V2).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.current().version.as_deref() != Some("v2") {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timeout waiting for rule reload"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(store.current().len(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_interval_watcher_keeps_running() {
        let file = rules_file(V1);
        let loader = RuleLoader::new(file.path());
        let store = Arc::new(RuleStore::open(&loader, None));

        let handle = RuleWatcher::new(loader, store.clone(), Duration::ZERO).start();

        std::fs::write(file.path(), V2).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.current().version.as_deref() != Some("v2") {
            assert!(!handle.is_finished(), "watcher task stopped");
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timeout waiting for rule reload"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_watcher_does_not_retry_rejected_source() {
        let file = rules_file(V1);
        let loader = RuleLoader::new(file.path());
        let store = Arc::new(RuleStore::open(&loader, None));

        std::fs::write(file.path(), "rules: [oops").unwrap();

        let mut watcher = RuleWatcher::new(loader, store.clone(), Duration::from_secs(60));
        assert!(watcher.check_for_updates().is_err());
        assert!(!watcher.check_for_updates().unwrap());

        assert_eq!(store.stats().failures, 1);
        assert_eq!(store.current().version.as_deref(), Some("v1"));
    }

    fn tagged_snapshot(tag: &str, action: Action, count: usize) -> RuleSnapshot {
        let rules = (0..count)
            .map(|i| RuleDef::pattern(format!("{}-{}", tag, i), "secret", action))
            .collect();
        let doc = RuleDocument {
            version: Some(tag.to_string()),
            rules,
            suppressions: Vec::new(),
        };
        RuleSnapshot::compile(&doc, tag.to_string()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reload_never_mixes_snapshots() {
        let store = Arc::new(RuleStore::new(tagged_snapshot("A", Action::Block, 8)));
        let engine = Arc::new(DecisionEngine::new(Arc::new(BreakerRegistry::default())));

        let reloader = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    let next = if i % 2 == 0 {
                        tagged_snapshot("B", Action::Flag, 5)
                    } else {
                        tagged_snapshot("A", Action::Block, 8)
                    };
                    store.publish(next);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut evaluators = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let engine = engine.clone();
            evaluators.push(tokio::spawn(async move {
                let request =
                    EvaluationRequest::new("agent", "a secret", "inbound", "/v1/chat");
                for _ in 0..300 {
                    let snapshot = store.current();
                    let decision = engine
                        .evaluate(&request, &snapshot, &EngineContext::default())
                        .await;

                    let all_a = decision.rule_ids.iter().all(|id| id.starts_with("A-"));
                    let all_b = decision.rule_ids.iter().all(|id| id.starts_with("B-"));
                    if all_a {
                        assert_eq!(decision.rule_ids.len(), 8);
                        assert_eq!(decision.action, Action::Block);
                    } else {
                        assert!(all_b, "mixed rule ids: {:?}", decision.rule_ids);
                        assert_eq!(decision.rule_ids.len(), 5);
                        assert_eq!(decision.action, Action::Flag);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        reloader.await.unwrap();
        for evaluator in evaluators {
            evaluator.await.unwrap();
        }
    }
}
