use async_trait::async_trait;
use thiserror::Error;

/// Errors an external classifier can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

/// External classification capability, e.g. an LLM judging a piece of text.
///
/// Calls are always routed through the circuit breaker named after the
/// dependency the rule declares. Any error is treated as a non-match.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns true if `text` matches what rule `rule_id` looks for.
    async fn classify(&self, rule_id: &str, text: &str) -> Result<bool, ClassifierError>;
}
