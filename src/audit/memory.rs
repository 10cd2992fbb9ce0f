use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::record::AuditRecord;
use super::sink::AuditSink;

/// In-memory audit sink.
///
/// Also used by tests to simulate tampering, lost records and an
/// unavailable backend.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get stored records (for assertions).
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Modify the stored record with `sequence` in place.
    /// Returns false if no such record exists.
    pub fn tamper(&self, sequence: u64, edit: impl FnOnce(&mut AuditRecord)) -> bool {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.sequence == sequence) {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    /// Drop the stored record with `sequence`.
    pub fn remove(&self, sequence: u64) -> Option<AuditRecord> {
        let mut records = self.records.lock();
        let index = records.iter().position(|r| r.sequence == sequence)?;
        Some(records.remove(index))
    }

    /// Store a record verbatim, bypassing the failure toggle.
    pub fn insert(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory sink is unavailable");
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<AuditRecord>> {
        Ok(self.records.lock().clone())
    }
}
