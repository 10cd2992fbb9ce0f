pub mod api;
pub mod audit;
pub mod breaker;
pub mod config;
pub mod domain;
pub mod engine;
pub mod observability;
pub mod policy;
pub mod rules;

pub use api::Gateway;
pub use audit::{AuditChain, AuditRecord, AuditSink};
pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use config::Config;
pub use domain::{Action, Decision, EvaluationRequest};
pub use engine::{Classifier, DecisionEngine, EngineContext};
pub use policy::{RuleLoader, RuleStore, RuleWatcher};
pub use rules::RuleSnapshot;
