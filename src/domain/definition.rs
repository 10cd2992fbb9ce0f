use serde::{Deserialize, Serialize};

use super::Action;

/// Default dependency name for externally-classified rules.
pub const DEFAULT_CLASSIFIER: &str = "llm-classifier";

/// Rule document as read from the rule source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    /// Optional version label
    #[serde(default)]
    pub version: Option<String>,

    /// Rule definitions, in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleDef>,

    /// Generic/specific suppression pairs
    #[serde(default)]
    pub suppressions: Vec<SuppressionDef>,
}

/// Definition of a single rule, before compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    /// Unique rule identifier
    pub id: String,

    /// Regular expression to search for
    #[serde(default)]
    pub pattern: Option<String>,

    /// Minimum number of non-overlapping pattern matches
    #[serde(default)]
    pub min_occurrences: Option<usize>,

    /// Text longer than this (in characters) matches
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Match is decided by an external classifier
    #[serde(default)]
    pub external: bool,

    /// Dependency name of the external classifier
    #[serde(default)]
    pub classifier: Option<String>,

    /// Applicable directions; empty means all
    #[serde(default)]
    pub directions: Vec<String>,

    /// Endpoint scope entries; empty means all
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Action to take when the rule matches
    pub action: Action,

    /// Enforce even when shadow mode is active
    #[serde(default)]
    pub shadow_override: bool,
}

impl RuleDef {
    /// Create a pattern rule definition with every optional field unset.
    pub fn pattern(id: impl Into<String>, pattern: impl Into<String>, action: Action) -> Self {
        RuleDef {
            id: id.into(),
            pattern: Some(pattern.into()),
            min_occurrences: None,
            max_length: None,
            external: false,
            classifier: None,
            directions: Vec::new(),
            endpoints: Vec::new(),
            action,
            shadow_override: false,
        }
    }

    /// Name of the dependency an external rule calls.
    pub fn classifier_name(&self) -> &str {
        self.classifier.as_deref().unwrap_or(DEFAULT_CLASSIFIER)
    }
}

/// When any `specific` rule matches, `generic` is dropped from the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuppressionDef {
    pub generic: String,
    pub specific: Vec<String>,
}
