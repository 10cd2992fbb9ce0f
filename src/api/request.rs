use serde::{Deserialize, Serialize};

use crate::domain::EvaluationRequest;

/// Request for a policy check, as received from the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Caller credential; authenticated before the request reaches the gateway
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    pub agent_id: String,

    pub text: String,

    /// "inbound" or "outbound"
    pub direction: String,

    /// Endpoint path the traffic is bound for
    #[serde(default)]
    pub endpoint: String,
}

impl CheckRequest {
    /// Convert to an evaluation request.
    pub fn to_evaluation_request(&self) -> EvaluationRequest {
        EvaluationRequest::new(
            self.agent_id.trim(),
            self.text.clone(),
            self.direction.trim(),
            self.endpoint.trim(),
        )
    }
}
