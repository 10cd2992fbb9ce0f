//! Hash-chained, append-only audit log.
//!
//! Every record carries the hash of its predecessor, so editing, removing
//! or reordering any persisted record is detectable by recomputing the chain
//! from the genesis constant.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use super::record::{decode_hash, genesis_hash, AuditRecord, ChainHash, DecisionRecord};
use super::sink::AuditSink;
use crate::observability::MetricsRegistry;

const FAULT_CHANNEL_CAPACITY: usize = 64;

/// What went wrong at a given position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityKind {
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// Stored previous-hash differs from the prior record's hash
    LinkMismatch,
    /// A sequence number is missing
    SequenceGap,
    /// A sequence number appears more than once
    DuplicateSequence,
}

impl fmt::Display for IntegrityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrityKind::HashMismatch => "hash mismatch",
            IntegrityKind::LinkMismatch => "link mismatch",
            IntegrityKind::SequenceGap => "sequence gap",
            IntegrityKind::DuplicateSequence => "duplicate sequence",
        };
        f.write_str(s)
    }
}

/// First integrity violation found while verifying.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("audit chain {kind} at sequence {sequence}")]
pub struct IntegrityFailure {
    pub sequence: u64,
    pub kind: IntegrityKind,
}

/// Errors returned by chain operations.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error(transparent)]
    Integrity(#[from] IntegrityFailure),

    #[error("audit sink error: {0}")]
    Sink(String),
}

/// Published when a record could not be persisted.
#[derive(Debug, Clone)]
pub struct AuditFault {
    pub sequence: u64,
    pub error: String,
}

#[derive(Debug)]
struct ChainHead {
    next_sequence: u64,
    last_hash: ChainHash,
    /// Sequences issued but not yet handed back by the sink
    in_flight: BTreeSet<u64>,
}

/// Append-only audit chain over an [`AuditSink`].
pub struct AuditChain {
    sink: Arc<dyn AuditSink>,
    head: Mutex<ChainHead>,
    /// Gaps already present when the chain was recovered
    recovered_gaps: Vec<Range<u64>>,
    faults: broadcast::Sender<AuditFault>,
    persist_failures: AtomicU64,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl AuditChain {
    /// Start a new chain at sequence 0.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        AuditChain::resume(sink, 0, genesis_hash(), Vec::new())
    }

    /// Resume a chain from the records already in `sink`.
    ///
    /// Hash, link and duplicate failures refuse to resume. Missing sequences
    /// are logged, counted and kept as known gaps; the chain continues after
    /// the highest persisted record.
    pub async fn recover(
        sink: Arc<dyn AuditSink>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Result<Self, AuditError> {
        let records = sink
            .list()
            .await
            .map_err(|e| AuditError::Sink(format!("{:#}", e)))?;

        let gaps = missing_ranges(&records);
        let count = scan_records(&records, None, &gaps)?;

        let (next_sequence, last_hash) = match records.iter().max_by_key(|r| r.sequence) {
            Some(last) => {
                let hash = decode_hash(&last.hash).ok_or(IntegrityFailure {
                    sequence: last.sequence,
                    kind: IntegrityKind::HashMismatch,
                })?;
                (last.sequence.saturating_add(1), hash)
            }
            None => (0, genesis_hash()),
        };

        if !gaps.is_empty() {
            for gap in &gaps {
                tracing::warn!(
                    from = gap.start,
                    to = gap.end - 1,
                    "Audit chain recovered with missing records"
                );
            }
            if let Some(metrics) = &metrics {
                metrics.record_audit_verify_failure();
            }
        }

        tracing::info!(
            records = count,
            next_sequence = next_sequence,
            gaps = gaps.len(),
            "Recovered audit chain"
        );

        let mut chain = AuditChain::resume(sink, next_sequence, last_hash, gaps);
        chain.metrics = metrics;
        Ok(chain)
    }

    fn resume(
        sink: Arc<dyn AuditSink>,
        next_sequence: u64,
        last_hash: ChainHash,
        recovered_gaps: Vec<Range<u64>>,
    ) -> Self {
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        AuditChain {
            sink,
            head: Mutex::new(ChainHead {
                next_sequence,
                last_hash,
                in_flight: BTreeSet::new(),
            }),
            recovered_gaps,
            faults,
            persist_failures: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append a decision to the chain.
    ///
    /// The returned record is final even if persisting it failed; such
    /// failures are counted, logged and published on the fault channel.
    /// Dropping the future before the sink answers counts as a failure.
    pub async fn append(&self, decision: DecisionRecord) -> AuditRecord {
        let record = {
            let mut head = self.head.lock();
            let sequence = head.next_sequence;
            let record = AuditRecord::seal(sequence, Utc::now(), decision, &head.last_hash);
            head.last_hash = decode_hash(&record.hash).unwrap_or(head.last_hash);
            head.next_sequence += 1;
            head.in_flight.insert(sequence);
            record
        };

        let mut pending = PendingPersist {
            chain: self,
            sequence: record.sequence,
            settled: false,
        };

        let persisted = match self.sink.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                self.report_persist_failure(record.sequence, format!("{:#}", e));
                false
            }
        };

        pending.settled = true;
        drop(pending);

        if let Some(metrics) = &self.metrics {
            metrics.record_audit_append(persisted);
        }

        record
    }

    fn report_persist_failure(&self, sequence: u64, error: String) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            sequence = sequence,
            error = %error,
            "Failed to persist audit record"
        );
        // No subscribers is fine.
        let _ = self.faults.send(AuditFault { sequence, error });
    }

    /// Verify every persisted record.
    ///
    /// Records still being written are left for the next run. Gaps found at
    /// recovery are skipped. Returns the number of records verified.
    pub async fn verify_chain(&self) -> Result<u64, AuditError> {
        let bound = {
            let head = self.head.lock();
            head.in_flight
                .iter()
                .next()
                .copied()
                .unwrap_or(head.next_sequence)
        };

        let records = self
            .sink
            .list()
            .await
            .map_err(|e| AuditError::Sink(format!("{:#}", e)))?;

        match scan_records(&records, Some(bound), &self.recovered_gaps) {
            Ok(count) => {
                tracing::debug!(records = count, "Audit chain verified");
                Ok(count)
            }
            Err(failure) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_audit_verify_failure();
                }
                tracing::error!(
                    sequence = failure.sequence,
                    kind = %failure.kind,
                    "Audit chain integrity failure"
                );
                Err(failure.into())
            }
        }
    }

    /// Receive persistence failures from now on.
    pub fn subscribe_faults(&self) -> broadcast::Receiver<AuditFault> {
        self.faults.subscribe()
    }

    /// Missing sequence ranges found by [`AuditChain::recover`].
    pub fn recovered_gaps(&self) -> &[Range<u64>] {
        &self.recovered_gaps
    }

    /// Hash of the latest record, or None before the first append.
    pub fn head(&self) -> Option<String> {
        let head = self.head.lock();
        (head.next_sequence > 0).then(|| hex::encode(head.last_hash))
    }

    /// Number of sequence numbers issued.
    pub fn len(&self) -> u64 {
        self.head.lock().next_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditChain")
            .field("len", &self.len())
            .field("recovered_gaps", &self.recovered_gaps)
            .field("persist_failures", &self.persist_failures())
            .finish()
    }
}

/// Releases an in-flight sequence when an append finishes or is dropped.
struct PendingPersist<'a> {
    chain: &'a AuditChain,
    sequence: u64,
    settled: bool,
}

impl Drop for PendingPersist<'_> {
    fn drop(&mut self) {
        self.chain.head.lock().in_flight.remove(&self.sequence);

        if !self.settled {
            self.chain.report_persist_failure(
                self.sequence,
                "append cancelled before the sink completed".to_string(),
            );
            if let Some(metrics) = &self.chain.metrics {
                metrics.record_audit_append(false);
            }
        }
    }
}

/// Verify a set of records in sequence order.
///
/// With `bound`, only sequences below it are checked and all of them must
/// be present. Returns the number of records checked.
pub fn verify_records(
    records: &[AuditRecord],
    bound: Option<u64>,
) -> Result<u64, IntegrityFailure> {
    scan_records(records, bound, &[])
}

/// Sequence ranges absent below the highest stored sequence.
fn missing_ranges(records: &[AuditRecord]) -> Vec<Range<u64>> {
    let mut sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
    sequences.sort_unstable();
    sequences.dedup();

    let mut gaps = Vec::new();
    let mut expected = 0u64;
    for sequence in sequences {
        if sequence > expected {
            gaps.push(expected..sequence);
        }
        expected = sequence.saturating_add(1);
    }
    gaps
}

/// First sequence in `range` not covered by `known`.
fn first_unknown(range: Range<u64>, known: &[Range<u64>]) -> Option<u64> {
    let mut sequence = range.start;
    while sequence < range.end {
        match known.iter().find(|gap| gap.contains(&sequence)) {
            Some(gap) => sequence = gap.end,
            None => return Some(sequence),
        }
    }
    None
}

/// Links cannot be checked across a known gap, so the record after one
/// starts a new run of links.
fn scan_records(
    records: &[AuditRecord],
    bound: Option<u64>,
    known_gaps: &[Range<u64>],
) -> Result<u64, IntegrityFailure> {
    let mut ordered: Vec<&AuditRecord> = records
        .iter()
        .filter(|r| bound.map_or(true, |b| r.sequence < b))
        .collect();
    ordered.sort_by_key(|r| r.sequence);

    let mut expected = 0u64;
    let mut checked = 0u64;
    let mut prev_hash = Some(hex::encode(genesis_hash()));

    for record in ordered {
        if record.sequence < expected {
            return Err(IntegrityFailure {
                sequence: record.sequence,
                kind: IntegrityKind::DuplicateSequence,
            });
        }
        if record.sequence > expected {
            if let Some(missing) = first_unknown(expected..record.sequence, known_gaps) {
                return Err(IntegrityFailure {
                    sequence: missing,
                    kind: IntegrityKind::SequenceGap,
                });
            }
            prev_hash = None;
        }
        if !record.is_sealed() {
            return Err(IntegrityFailure {
                sequence: record.sequence,
                kind: IntegrityKind::HashMismatch,
            });
        }
        if prev_hash.as_ref().is_some_and(|h| *h != record.prev_hash) {
            return Err(IntegrityFailure {
                sequence: record.sequence,
                kind: IntegrityKind::LinkMismatch,
            });
        }

        prev_hash = Some(record.hash.clone());
        expected = record.sequence.saturating_add(1);
        checked += 1;
    }

    if let Some(bound) = bound {
        if let Some(missing) = first_unknown(expected..bound, known_gaps) {
            return Err(IntegrityFailure {
                sequence: missing,
                kind: IntegrityKind::SequenceGap,
            });
        }
    }

    Ok(checked)
}
