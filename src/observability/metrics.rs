use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Action;

/// Metrics registry for the gateway.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total decisions produced
    pub decisions_total: AtomicU64,

    /// Decisions by final action
    pub decisions_allow: AtomicU64,
    pub decisions_flag: AtomicU64,
    pub decisions_block: AtomicU64,

    /// Flag/block outcomes downgraded by shadow mode
    pub shadow_downgrades: AtomicU64,

    /// Decision latency buckets (microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,

    /// Rule evaluation counts
    pub rules_evaluated_total: AtomicU64,
    pub rules_matched_total: AtomicU64,
    pub rules_suppressed_total: AtomicU64,

    /// External classifier calls
    pub classifier_calls_total: AtomicU64,
    pub classifier_failures: AtomicU64,
    pub classifier_short_circuits: AtomicU64,

    /// Audit chain operations
    pub audit_appends_total: AtomicU64,
    pub audit_persist_errors: AtomicU64,
    pub audit_verify_failures: AtomicU64,

    /// Rule reloads
    pub rule_reloads_total: AtomicU64,
    pub rule_reload_errors: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a final decision action.
    pub fn record_decision(&self, action: Action) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);

        match action {
            Action::Allow => {
                self.decisions_allow.fetch_add(1, Ordering::Relaxed);
            }
            Action::Flag => {
                self.decisions_flag.fetch_add(1, Ordering::Relaxed);
            }
            Action::Block => {
                self.decisions_block.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_shadow_downgrade(&self) {
        self.shadow_downgrades.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decision latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        if micros < 1000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 5000 {
            self.latency_1_5ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10000 {
            self.latency_5_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 50000 {
            self.latency_10_50ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100000 {
            self.latency_50_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rule evaluation.
    pub fn record_rule_evaluation(&self, matched: bool) {
        self.rules_evaluated_total.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.rules_matched_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_suppressed(&self, count: usize) {
        self.rules_suppressed_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record the outcome of a classifier call.
    pub fn record_classifier_call(&self, outcome: ClassifierOutcome) {
        match outcome {
            ClassifierOutcome::Completed => {
                self.classifier_calls_total.fetch_add(1, Ordering::Relaxed);
            }
            ClassifierOutcome::Failed => {
                self.classifier_calls_total.fetch_add(1, Ordering::Relaxed);
                self.classifier_failures.fetch_add(1, Ordering::Relaxed);
            }
            ClassifierOutcome::ShortCircuited => {
                self.classifier_short_circuits
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record an audit append.
    pub fn record_audit_append(&self, persisted: bool) {
        self.audit_appends_total.fetch_add(1, Ordering::Relaxed);
        if !persisted {
            self.audit_persist_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audit_verify_failure(&self) {
        self.audit_verify_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rule reload.
    pub fn record_rule_reload(&self, success: bool) {
        self.rule_reloads_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rule_reload_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP gatekeeper_decisions_total Total number of decisions
# TYPE gatekeeper_decisions_total counter
gatekeeper_decisions_total {}

# HELP gatekeeper_decisions Decisions by final action
# TYPE gatekeeper_decisions counter
gatekeeper_decisions{{action="allow"}} {}
gatekeeper_decisions{{action="flag"}} {}
gatekeeper_decisions{{action="block"}} {}

# HELP gatekeeper_shadow_downgrades_total Enforcing outcomes downgraded by shadow mode
# TYPE gatekeeper_shadow_downgrades_total counter
gatekeeper_shadow_downgrades_total {}

# HELP gatekeeper_decision_latency_bucket Decision latency histogram
# TYPE gatekeeper_decision_latency_bucket counter
gatekeeper_decision_latency_bucket{{le="0.001"}} {}
gatekeeper_decision_latency_bucket{{le="0.005"}} {}
gatekeeper_decision_latency_bucket{{le="0.01"}} {}
gatekeeper_decision_latency_bucket{{le="0.05"}} {}
gatekeeper_decision_latency_bucket{{le="0.1"}} {}
gatekeeper_decision_latency_bucket{{le="+Inf"}} {}

# HELP gatekeeper_rules_evaluated_total Total rule evaluations
# TYPE gatekeeper_rules_evaluated_total counter
gatekeeper_rules_evaluated_total {}

# HELP gatekeeper_rules_matched_total Total rules that matched
# TYPE gatekeeper_rules_matched_total counter
gatekeeper_rules_matched_total {}

# HELP gatekeeper_rules_suppressed_total Generic rule matches suppressed by specific ones
# TYPE gatekeeper_rules_suppressed_total counter
gatekeeper_rules_suppressed_total {}

# HELP gatekeeper_classifier_calls_total External classifier calls attempted
# TYPE gatekeeper_classifier_calls_total counter
gatekeeper_classifier_calls_total {}

# HELP gatekeeper_classifier_failures_total External classifier calls that failed
# TYPE gatekeeper_classifier_failures_total counter
gatekeeper_classifier_failures_total {}

# HELP gatekeeper_classifier_short_circuits_total Calls rejected by an open breaker
# TYPE gatekeeper_classifier_short_circuits_total counter
gatekeeper_classifier_short_circuits_total {}

# HELP gatekeeper_audit_appends_total Audit records appended
# TYPE gatekeeper_audit_appends_total counter
gatekeeper_audit_appends_total {}

# HELP gatekeeper_audit_persist_errors_total Audit records that failed to persist
# TYPE gatekeeper_audit_persist_errors_total counter
gatekeeper_audit_persist_errors_total {}

# HELP gatekeeper_audit_verify_failures_total Failed audit chain verifications
# TYPE gatekeeper_audit_verify_failures_total counter
gatekeeper_audit_verify_failures_total {}

# HELP gatekeeper_rule_reloads_total Rule reload attempts
# TYPE gatekeeper_rule_reloads_total counter
gatekeeper_rule_reloads_total {}

# HELP gatekeeper_rule_reload_errors_total Rejected rule reloads
# TYPE gatekeeper_rule_reload_errors_total counter
gatekeeper_rule_reload_errors_total {}
"#,
            self.decisions_total.load(Ordering::Relaxed),
            self.decisions_allow.load(Ordering::Relaxed),
            self.decisions_flag.load(Ordering::Relaxed),
            self.decisions_block.load(Ordering::Relaxed),
            self.shadow_downgrades.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_5ms.load(Ordering::Relaxed),
            self.latency_5_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
            self.rules_evaluated_total.load(Ordering::Relaxed),
            self.rules_matched_total.load(Ordering::Relaxed),
            self.rules_suppressed_total.load(Ordering::Relaxed),
            self.classifier_calls_total.load(Ordering::Relaxed),
            self.classifier_failures.load(Ordering::Relaxed),
            self.classifier_short_circuits.load(Ordering::Relaxed),
            self.audit_appends_total.load(Ordering::Relaxed),
            self.audit_persist_errors.load(Ordering::Relaxed),
            self.audit_verify_failures.load(Ordering::Relaxed),
            self.rule_reloads_total.load(Ordering::Relaxed),
            self.rule_reload_errors.load(Ordering::Relaxed),
        )
    }
}

/// How an external classifier call ended, from the metrics point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierOutcome {
    Completed,
    Failed,
    ShortCircuited,
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
