pub mod endpoint;
pub mod rule;

pub use endpoint::EndpointMatcher;
pub use rule::{LocalMatch, Rule, RuleError, RuleMatcher};

use chrono::{DateTime, Utc};

use crate::domain::RuleDocument;

/// Generic rule dropped from a result when any of its specific rules matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    pub generic: String,
    pub specific: Vec<String>,
}

/// Immutable, fully-compiled rule set.
///
/// Snapshots are published behind an `Arc` and never mutated afterwards;
/// evaluations that started on an older snapshot finish on it.
#[derive(Debug)]
pub struct RuleSnapshot {
    pub rules: Vec<Rule>,
    pub suppressions: Vec<Suppression>,
    pub version: Option<String>,
    /// SHA-256 of the source bytes, hex encoded
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl RuleSnapshot {
    /// Compile every rule of a document. Any failure rejects the whole batch.
    pub fn compile(document: &RuleDocument, fingerprint: String) -> Result<Self, RuleError> {
        let rules = document
            .rules
            .iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let suppressions = document
            .suppressions
            .iter()
            .map(|s| Suppression {
                generic: s.generic.trim().to_string(),
                specific: s.specific.iter().map(|id| id.trim().to_string()).collect(),
            })
            .collect();

        Ok(RuleSnapshot {
            rules,
            suppressions,
            version: document.version.clone(),
            fingerprint,
            loaded_at: Utc::now(),
        })
    }

    /// Create an empty snapshot; every request is allowed.
    pub fn empty() -> Self {
        RuleSnapshot {
            rules: Vec::new(),
            suppressions: Vec::new(),
            version: None,
            fingerprint: String::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    /// Version label for logs; falls back to a short fingerprint.
    pub fn label(&self) -> String {
        match &self.version {
            Some(v) => v.clone(),
            None if self.fingerprint.is_empty() => "empty".to_string(),
            None => self.fingerprint.chars().take(12).collect(),
        }
    }
}
