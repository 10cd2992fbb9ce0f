use serde::{Deserialize, Serialize};

use super::Direction;

/// A single piece of traffic to classify.
///
/// Direction is kept as the raw string received from the boundary; the
/// engine normalizes it and treats an unknown value as a no-match request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub agent_id: String,
    pub text: String,
    pub direction: String,
    pub endpoint: String,
}

impl EvaluationRequest {
    pub fn new(
        agent_id: impl Into<String>,
        text: impl Into<String>,
        direction: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        EvaluationRequest {
            agent_id: agent_id.into(),
            text: text.into(),
            direction: direction.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Parsed direction, or None if the value is not a known direction.
    pub fn parsed_direction(&self) -> Option<Direction> {
        Direction::parse(&self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_direction() {
        let req = EvaluationRequest::new("agent-1", "hi", "InBound", "/v1/chat");
        assert_eq!(req.parsed_direction(), Some(Direction::Inbound));

        let bad = EvaluationRequest::new("agent-1", "hi", "up", "/v1/chat");
        assert_eq!(bad.parsed_direction(), None);
    }
}
