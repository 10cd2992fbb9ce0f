use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy action with severity ordering.
///
/// Actions are ordered by severity from least to most severe.
/// When multiple rules match, the most severe action wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Text passes through untouched
    Allow,
    /// Text passes but is marked for review
    Flag,
    /// Text is rejected
    Block,
}

impl Action {
    /// Returns the more severe of two actions.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }

    /// Returns true if this action is enforced (flag or block).
    #[inline]
    pub fn is_enforcing(&self) -> bool {
        !matches!(self, Action::Allow)
    }

    /// Stable lowercase name, used in messages and the audit encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Flag => "flag",
            Action::Block => "block",
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Allow
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
