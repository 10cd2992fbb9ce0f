use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Action, Decision, EvaluationRequest};

/// Version tag prefixed to every canonical encoding.
pub const ENCODING_TAG: &str = "gatekeeper-audit-v1";

/// Seed of the predecessor hash of sequence 0.
pub const GENESIS_SEED: &str = "gatekeeper-audit-genesis";

/// Raw SHA-256 digest.
pub type ChainHash = [u8; 32];

/// The predecessor hash of the first record.
pub fn genesis_hash() -> ChainHash {
    Sha256::digest(GENESIS_SEED.as_bytes()).into()
}

/// Parse a lowercase hex chain hash.
pub fn decode_hash(hex_hash: &str) -> Option<ChainHash> {
    let bytes = hex::decode(hex_hash).ok()?;
    bytes.try_into().ok()
}

/// Summary of one decision, as recorded in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: Uuid,
    pub agent_id: String,
    pub direction: String,
    pub endpoint: String,
    pub action: Action,
    pub rule_ids: Vec<String>,
    pub message: String,
}

impl DecisionRecord {
    /// Summarize a decision made for `request` under a fresh decision id.
    pub fn new(request: &EvaluationRequest, decision: &Decision) -> Self {
        DecisionRecord {
            decision_id: Uuid::new_v4(),
            agent_id: request.agent_id.clone(),
            direction: request.direction.clone(),
            endpoint: request.endpoint.clone(),
            action: decision.action,
            rule_ids: decision.rule_ids.clone(),
            message: decision.message.clone(),
        }
    }
}

/// One link of the audit chain. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub decision: DecisionRecord,
    /// Hash of the previous record, lowercase hex
    pub prev_hash: String,
    /// Hash of this record, lowercase hex
    pub hash: String,
}

impl AuditRecord {
    /// Build a record linked to `prev`.
    pub fn seal(
        sequence: u64,
        timestamp: DateTime<Utc>,
        decision: DecisionRecord,
        prev: &ChainHash,
    ) -> Self {
        let hash = chain_hash(prev, &canonical_encoding(sequence, &timestamp, &decision));
        AuditRecord {
            sequence,
            timestamp,
            decision,
            prev_hash: hex::encode(prev),
            hash: hex::encode(hash),
        }
    }

    /// Recompute this record's hash from its stored content and stored
    /// predecessor hash. None if the stored predecessor is not valid hex.
    pub fn recompute_hash(&self) -> Option<ChainHash> {
        let prev = decode_hash(&self.prev_hash)?;
        Some(chain_hash(
            &prev,
            &canonical_encoding(self.sequence, &self.timestamp, &self.decision),
        ))
    }

    /// Returns true if the stored hash matches the recomputed one.
    pub fn is_sealed(&self) -> bool {
        self.recompute_hash()
            .map(|hash| hex::encode(hash) == self.hash)
            .unwrap_or(false)
    }
}

/// SHA-256(prev ∥ encoding).
pub fn chain_hash(prev: &ChainHash, encoding: &[u8]) -> ChainHash {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(encoding);
    hasher.finalize().into()
}

/// Version 1 canonical encoding.
///
/// The tag followed by each field as `<byte length>:<bytes>`, so no field
/// value can be confused with a field boundary.
pub fn canonical_encoding(
    sequence: u64,
    timestamp: &DateTime<Utc>,
    decision: &DecisionRecord,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(ENCODING_TAG.as_bytes());

    let sequence = sequence.to_string();
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let decision_id = decision.decision_id.to_string();
    let rule_ids = decision.rule_ids.join(",");

    for field in [
        sequence.as_str(),
        timestamp.as_str(),
        decision_id.as_str(),
        decision.agent_id.as_str(),
        decision.direction.as_str(),
        decision.endpoint.as_str(),
        decision.action.as_str(),
        rule_ids.as_str(),
        decision.message.as_str(),
    ] {
        push_field(&mut out, field);
    }

    out
}

fn push_field(out: &mut Vec<u8>, field: &str) {
    out.extend_from_slice(field.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(field.as_bytes());
}
