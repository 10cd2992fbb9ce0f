use async_trait::async_trait;

use super::record::AuditRecord;

/// Durable home of audit records.
///
/// Implementations only store and return records; hashing, sequencing and
/// verification belong to the chain.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one sealed record.
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;

    /// Every stored record, in storage order.
    async fn list(&self) -> anyhow::Result<Vec<AuditRecord>>;
}
