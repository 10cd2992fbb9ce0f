use serde::Serialize;
use uuid::Uuid;

use crate::breaker::BreakerStatus;
use crate::domain::{Action, Decision};

/// Response to a policy check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResponse {
    pub action: Action,

    /// Matched rules in encounter order
    pub rule_ids: Vec<String>,

    pub message: String,

    /// Identifier of the audit entry for this decision
    pub decision_id: Uuid,

    /// Position of the decision in the audit chain
    pub audit_sequence: u64,

    /// Version label of the rule set that decided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_version: Option<String>,
}

impl CheckResponse {
    pub fn new(
        decision: Decision,
        decision_id: Uuid,
        audit_sequence: u64,
        rules_version: Option<String>,
    ) -> Self {
        CheckResponse {
            action: decision.action,
            rule_ids: decision.rule_ids,
            message: decision.message,
            decision_id,
            audit_sequence,
            rules_version,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub rules_version: String,
    pub uptime_secs: u64,
    pub shadow_mode: bool,
    pub audit_records: u64,
    pub breakers: Vec<BreakerStatus>,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub rules_version: String,
    pub rules: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        ErrorResponse::new(message, "NOT_READY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_response_serialization() {
        let resp = CheckResponse::new(
            Decision::new(
                Action::Block,
                vec!["SSN-1.0".to_string()],
                "Blocked by policy rules: SSN-1.0",
            ),
            Uuid::nil(),
            4,
            Some("v1".to_string()),
        );

        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains(r#""action":"block""#));
        assert!(json.contains("SSN-1.0"));
        assert!(json.contains(r#""audit_sequence":4"#));
    }

    #[test]
    fn test_rules_version_omitted_when_absent() {
        let decision = Decision::no_match("No policy rules matched");
        let resp = CheckResponse::new(decision, Uuid::nil(), 0, None);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("rules_version"));
        assert!(json.contains(r#""rule_ids":[]"#));
    }

    #[test]
    fn test_not_ready_error() {
        let err = ErrorResponse::not_ready("No rules loaded");
        assert_eq!(err.code, "NOT_READY");
    }
}
