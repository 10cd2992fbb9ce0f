use serde::{Deserialize, Serialize};

use super::Action;

/// Outcome of evaluating one request against a rule snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Final action after precedence and shadow-mode policy
    pub action: Action,

    /// Matched rule identifiers in encounter order, before any shadow downgrade
    pub rule_ids: Vec<String>,

    /// Human-readable explanation
    pub message: String,
}

impl Decision {
    pub fn new(action: Action, rule_ids: Vec<String>, message: impl Into<String>) -> Self {
        Decision {
            action,
            rule_ids,
            message: message.into(),
        }
    }

    /// Allow with no matched rules.
    pub fn no_match(message: impl Into<String>) -> Self {
        Decision::new(Action::Allow, Vec::new(), message)
    }

    /// Returns true if any rule matched.
    pub fn has_matches(&self) -> bool {
        !self.rule_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match() {
        let decision = Decision::no_match("nothing");
        assert_eq!(decision.action, Action::Allow);
        assert!(!decision.has_matches());
    }

    #[test]
    fn test_decision_serialization() {
        let decision = Decision::new(Action::Block, vec!["SSN-1.0".to_string()], "blocked");
        let json = serde_json::to_string(&decision).unwrap();

        assert!(json.contains("\"block\""));
        assert!(json.contains("SSN-1.0"));
    }
}
