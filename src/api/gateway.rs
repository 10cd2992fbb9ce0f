use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audit::{AuditChain, AuditRecord, DecisionRecord};
use crate::domain::{Decision, EvaluationRequest};
use crate::engine::{DecisionEngine, EngineContext};
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::policy::RuleStore;

use super::request::CheckRequest;
use super::response::{CheckResponse, ErrorResponse, HealthResponse, ReadyResponse};

/// A decision together with its audit entry.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub decision: Decision,
    pub record: AuditRecord,
    /// Version label of the snapshot that decided
    pub rules_version: Option<String>,
}

/// Evaluation interface for the transport layer.
///
/// Each check takes the current rule snapshot, evaluates it, appends the
/// outcome to the audit chain and records metrics.
pub struct Gateway {
    store: Arc<RuleStore>,
    engine: Arc<DecisionEngine>,
    audit: Arc<AuditChain>,
    metrics: Arc<MetricsRegistry>,
    shadow_mode: AtomicBool,
    latency_budget: Duration,
    start_time: Instant,
    version: String,
}

impl Gateway {
    pub fn new(
        store: Arc<RuleStore>,
        engine: Arc<DecisionEngine>,
        audit: Arc<AuditChain>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Gateway {
            store,
            engine,
            audit,
            metrics,
            shadow_mode: AtomicBool::new(false),
            latency_budget: Duration::from_millis(100),
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_shadow_mode(self, shadow_mode: bool) -> Self {
        self.shadow_mode.store(shadow_mode, Ordering::Relaxed);
        self
    }

    pub fn with_latency_budget(mut self, budget: Duration) -> Self {
        self.latency_budget = budget;
        self
    }

    /// Switch shadow mode for subsequent checks.
    pub fn set_shadow_mode(&self, shadow_mode: bool) {
        let previous = self.shadow_mode.swap(shadow_mode, Ordering::Relaxed);
        if previous != shadow_mode {
            info!(shadow_mode = shadow_mode, "Shadow mode changed");
        }
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow_mode.load(Ordering::Relaxed)
    }

    /// Evaluate a request and append the decision to the audit chain.
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Evaluated {
        let start = Instant::now();
        let _timing = TimingGuard::new(&self.metrics);

        let snapshot = self.store.current();
        let ctx = EngineContext {
            shadow_mode: self.shadow_mode(),
        };

        let decision = self.engine.evaluate(request, &snapshot, &ctx).await;
        self.metrics.record_decision(decision.action);

        let record = self
            .audit
            .append(DecisionRecord::new(request, &decision))
            .await;

        let elapsed = start.elapsed();
        if elapsed > self.latency_budget {
            warn!(
                agent_id = %request.agent_id,
                latency_ms = elapsed.as_millis() as u64,
                budget_ms = self.latency_budget.as_millis() as u64,
                "Decision latency exceeded budget"
            );
        }

        info!(
            agent_id = %request.agent_id,
            action = %decision.action,
            rules = decision.rule_ids.len(),
            sequence = record.sequence,
            rules_version = %snapshot.label(),
            "Decision completed"
        );

        Evaluated {
            decision,
            record,
            rules_version: snapshot.version.clone(),
        }
    }

    /// Handle a check request from the transport layer.
    pub async fn check(&self, request: &CheckRequest) -> CheckResponse {
        let Evaluated {
            decision,
            record,
            rules_version,
        } = self.evaluate(&request.to_evaluation_request()).await;

        CheckResponse::new(
            decision,
            record.decision.decision_id,
            record.sequence,
            rules_version,
        )
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            version: self.version.clone(),
            rules_version: self.store.current().label(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            shadow_mode: self.shadow_mode(),
            audit_records: self.audit.len(),
            breakers: self.engine.breakers().statuses(),
        }
    }

    /// Ready once a non-empty rule set is published.
    pub fn ready(&self) -> Result<ReadyResponse, ErrorResponse> {
        let snapshot = self.store.current();

        if snapshot.is_empty() {
            return Err(ErrorResponse::not_ready("No rules loaded"));
        }

        Ok(ReadyResponse {
            ready: true,
            rules_version: snapshot.label(),
            rules: snapshot.len(),
        })
    }

    /// Prometheus text exposition of all counters.
    pub fn metrics_text(&self) -> String {
        format!(
            "{}
# HELP gatekeeper_uptime_seconds Application uptime in seconds
# TYPE gatekeeper_uptime_seconds counter
gatekeeper_uptime_seconds {}

# HELP gatekeeper_rules_loaded Number of rules in the current snapshot
# TYPE gatekeeper_rules_loaded gauge
gatekeeper_rules_loaded {}
",
            self.metrics.to_prometheus(),
            self.start_time.elapsed().as_secs(),
            self.store.current().len(),
        )
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<AuditChain> {
        &self.audit
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}
