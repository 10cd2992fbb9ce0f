//! Turning a list of matched rules into a final action.
//!
//! Order of operations: suppression, then precedence, then shadow-mode
//! policy. Reported rule ids are taken after suppression and before any
//! shadow downgrade.

use crate::domain::Action;
use crate::rules::Suppression;

/// One matched rule, in snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub rule_id: &'a str,
    pub action: Action,
    pub shadow_override: bool,
}

/// Outcome of resolving a match list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Final action
    pub action: Action,
    /// Reported rule ids (post-suppression, pre-downgrade)
    pub rule_ids: Vec<String>,
    /// Number of generic rules dropped by suppression
    pub suppressed: usize,
    /// Action shadow mode prevented from being enforced
    pub downgraded_from: Option<Action>,
    /// Rules whose shadow override decided the action
    pub override_ids: Vec<String>,
}

impl Resolution {
    /// Human-readable explanation of the outcome.
    pub fn message(&self) -> String {
        if self.rule_ids.is_empty() {
            return "No policy rules matched".to_string();
        }

        if let Some(would) = self.downgraded_from {
            return format!(
                "Shadow mode: would {} (rules: {}); not enforced",
                would,
                self.rule_ids.join(", ")
            );
        }

        if !self.override_ids.is_empty() {
            return format!(
                "Shadow mode: enforcing {} from override rules: {}",
                self.action,
                self.override_ids.join(", ")
            );
        }

        match self.action {
            Action::Block => format!("Blocked by policy rules: {}", self.rule_ids.join(", ")),
            Action::Flag => format!("Flagged by policy rules: {}", self.rule_ids.join(", ")),
            Action::Allow => format!("Allowed; matched rules: {}", self.rule_ids.join(", ")),
        }
    }
}

/// Highest severity among matches; allow when there are none.
pub fn highest<'a, 'r: 'a>(matches: impl IntoIterator<Item = &'a Match<'r>>) -> Action {
    matches
        .into_iter()
        .fold(Action::Allow, |acc, m| acc.max(m.action))
}

/// Generic rule ids to drop: each generic that matched alongside at least
/// one of its specific rules.
pub fn suppressed_ids<'a>(matches: &[Match<'a>], suppressions: &'a [Suppression]) -> Vec<&'a str> {
    let matched = |id: &str| matches.iter().any(|m| m.rule_id == id);

    suppressions
        .iter()
        .filter(|s| matched(&s.generic) && s.specific.iter().any(|id| matched(id)))
        .map(|s| s.generic.as_str())
        .collect()
}

/// Apply suppression, precedence and shadow-mode policy.
pub fn resolve(
    matches: &[Match<'_>],
    suppressions: &[Suppression],
    shadow_mode: bool,
) -> Resolution {
    let dropped = suppressed_ids(matches, suppressions);

    let mut kept: Vec<&Match<'_>> = Vec::with_capacity(matches.len());
    let mut suppressed = 0;
    for m in matches {
        if dropped.contains(&m.rule_id) {
            suppressed += 1;
            continue;
        }
        if kept.iter().any(|k| k.rule_id == m.rule_id) {
            continue;
        }
        kept.push(m);
    }

    let rule_ids: Vec<String> = kept.iter().map(|m| m.rule_id.to_string()).collect();
    let action = highest(kept.iter().copied());

    if !shadow_mode || !action.is_enforcing() {
        return Resolution {
            action,
            rule_ids,
            suppressed,
            downgraded_from: None,
            override_ids: Vec::new(),
        };
    }

    let overrides: Vec<&Match<'_>> = kept
        .iter()
        .copied()
        .filter(|m| m.shadow_override)
        .collect();

    if overrides.is_empty() {
        return Resolution {
            action: Action::Allow,
            rule_ids,
            suppressed,
            downgraded_from: Some(action),
            override_ids: Vec::new(),
        };
    }

    Resolution {
        action: highest(overrides.iter().copied()),
        rule_ids,
        suppressed,
        downgraded_from: None,
        override_ids: overrides.iter().map(|m| m.rule_id.to_string()).collect(),
    }
}
