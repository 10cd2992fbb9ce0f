use regex::Regex;
use thiserror::Error;

use crate::domain::{Action, Direction, RuleDef};

use super::endpoint::EndpointMatcher;

/// Errors raised while compiling a single rule definition.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule {rule_id}: invalid pattern: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule_id}: invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        rule_id: String,
        endpoint: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule_id}: {message}")]
    Schema { rule_id: String, message: String },
}

impl RuleError {
    fn schema(rule_id: &str, message: impl Into<String>) -> Self {
        RuleError::Schema {
            rule_id: rule_id.to_string(),
            message: message.into(),
        }
    }
}

/// How a rule decides whether text matches.
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// Count non-overlapping regex matches
    Pattern {
        regex: Regex,
        min_occurrences: Option<usize>,
    },
    /// Text longer than `max` characters
    Length { max: usize },
    /// Delegate to an external classifier; an optional pattern gates the call
    External {
        dependency: String,
        prefilter: Option<Regex>,
    },
}

/// Result of the in-process part of rule matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMatch<'a> {
    Matched,
    NotMatched,
    /// Only the named classifier can decide
    NeedsClassifier(&'a str),
}

/// A compiled rule. Constructed only by [`Rule::compile`].
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    matcher: RuleMatcher,
    directions: Vec<Direction>,
    endpoints: Vec<EndpointMatcher>,
    action: Action,
    shadow_override: bool,
}

impl Rule {
    /// Validate and compile a rule definition.
    pub fn compile(def: &RuleDef) -> Result<Self, RuleError> {
        let id = def.id.trim();
        if id.is_empty() {
            return Err(RuleError::schema("<unnamed>", "rule id cannot be empty"));
        }

        let matcher = compile_matcher(id, def)?;

        let mut directions = Vec::with_capacity(def.directions.len());
        for raw in &def.directions {
            let direction = Direction::parse(raw)
                .ok_or_else(|| RuleError::schema(id, format!("unknown direction {:?}", raw)))?;
            if !directions.contains(&direction) {
                directions.push(direction);
            }
        }

        let endpoints = def
            .endpoints
            .iter()
            .map(|entry| {
                EndpointMatcher::compile(entry).map_err(|source| RuleError::InvalidEndpoint {
                    rule_id: id.to_string(),
                    endpoint: entry.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Rule {
            id: id.to_string(),
            matcher,
            directions,
            endpoints,
            action: def.action,
            shadow_override: def.shadow_override,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn shadow_override(&self) -> bool {
        self.shadow_override
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub fn is_external(&self) -> bool {
        matches!(self.matcher, RuleMatcher::External { .. })
    }

    /// Direction and endpoint scope check.
    #[inline]
    pub fn applies_to(&self, direction: Direction, endpoint: &str) -> bool {
        let direction_ok = self.directions.is_empty() || self.directions.contains(&direction);
        direction_ok
            && (self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.matches(endpoint)))
    }

    /// Everything that can be decided without leaving the process.
    pub fn match_local(&self, text: &str) -> LocalMatch<'_> {
        match &self.matcher {
            RuleMatcher::Pattern {
                regex,
                min_occurrences,
            } => {
                let needed = min_occurrences.unwrap_or(1);
                // Stop counting once the threshold is reached.
                let count = regex.find_iter(text).take(needed).count();
                if count >= needed {
                    LocalMatch::Matched
                } else {
                    LocalMatch::NotMatched
                }
            }
            RuleMatcher::Length { max } => {
                if text.chars().count() > *max {
                    LocalMatch::Matched
                } else {
                    LocalMatch::NotMatched
                }
            }
            RuleMatcher::External {
                dependency,
                prefilter,
            } => match prefilter {
                Some(regex) if !regex.is_match(text) => LocalMatch::NotMatched,
                _ => LocalMatch::NeedsClassifier(dependency),
            },
        }
    }
}

fn compile_matcher(id: &str, def: &RuleDef) -> Result<RuleMatcher, RuleError> {
    let pattern = def
        .pattern
        .as_deref()
        .map(|p| {
            if p.is_empty() {
                return Err(RuleError::schema(id, "pattern cannot be empty"));
            }
            Regex::new(p).map_err(|source| RuleError::InvalidPattern {
                rule_id: id.to_string(),
                source,
            })
        })
        .transpose()?;

    if def.min_occurrences == Some(0) {
        return Err(RuleError::schema(id, "min_occurrences must be at least 1"));
    }
    if def.max_length == Some(0) {
        return Err(RuleError::schema(id, "max_length must be at least 1"));
    }
    if def.classifier.is_some() && !def.external {
        return Err(RuleError::schema(id, "classifier is only valid on external rules"));
    }

    if def.external {
        if def.max_length.is_some() || def.min_occurrences.is_some() {
            return Err(RuleError::schema(
                id,
                "external rules accept only an optional prefilter pattern",
            ));
        }
        let dependency = def.classifier_name().trim();
        if dependency.is_empty() {
            return Err(RuleError::schema(id, "classifier name cannot be empty"));
        }
        return Ok(RuleMatcher::External {
            dependency: dependency.to_string(),
            prefilter: pattern,
        });
    }

    if let Some(max) = def.max_length {
        if pattern.is_some() || def.min_occurrences.is_some() {
            return Err(RuleError::schema(
                id,
                "max_length cannot be combined with pattern or min_occurrences",
            ));
        }
        return Ok(RuleMatcher::Length { max });
    }

    match pattern {
        Some(regex) => Ok(RuleMatcher::Pattern {
            regex,
            min_occurrences: def.min_occurrences,
        }),
        None => Err(RuleError::schema(
            id,
            "rule needs a pattern, max_length or external classifier",
        )),
    }
}
